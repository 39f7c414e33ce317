// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Identity Resolver: a stable per-participant id carried in a cookie, and a
//! best-effort origin address used only for first-time team assignment.

use core_types::Identity;
use hyper::{HeaderMap, header::COOKIE};
use uuid::Uuid;

pub const IDENTITY_COOKIE: &str = "cid";
pub const IDENTITY_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";
const MAX_IDENTITY_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    /// The id was created for this request and must be handed back.
    pub minted: bool,
}

impl ResolvedIdentity {
    /// `Set-Cookie` value persisting a freshly minted id.
    pub fn set_cookie(&self, secure: bool) -> Option<String> {
        self.minted.then(|| {
            set_cookie(
                IDENTITY_COOKIE,
                self.identity.as_str(),
                IDENTITY_MAX_AGE_SECS,
                secure,
            )
        })
    }
}

/// Returns the presented id unchanged or mints a new one. Never touches any
/// store.
pub fn resolve(headers: &HeaderMap) -> ResolvedIdentity {
    match cookie_value(headers, IDENTITY_COOKIE).filter(|value| is_well_formed(value)) {
        Some(existing) => ResolvedIdentity {
            identity: Identity::new(existing),
            minted: false,
        },
        None => ResolvedIdentity {
            identity: Identity::new(Uuid::new_v4().to_string()),
            minted: true,
        },
    }
}

fn is_well_formed(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_IDENTITY_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// First forwarded-for hop, then the direct-peer header, then loopback.
pub fn origin_address(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        return if first.is_empty() {
            LOOPBACK_ADDRESS.to_string()
        } else {
            first.to_string()
        };
    }
    match header_str(headers, "x-real-ip") {
        Some(real_ip) if !real_ip.trim().is_empty() => real_ip.trim().to_string(),
        _ => LOOPBACK_ADDRESS.to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Value of cookie `name` across every `Cookie` header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

pub fn set_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie =
        format!("{name}={value}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
