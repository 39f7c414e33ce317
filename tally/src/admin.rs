// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const ADMIN_COOKIE: &str = "admin-session";

/// In-process admin sessions behind an opaque random token.
pub struct AdminSessions {
    password: Vec<u8>,
    ttl: Duration,
    sessions: Mutex<HashMap<String, Instant>>,
}

impl AdminSessions {
    pub fn new(password: impl Into<String>, ttl: Duration) -> Self {
        Self {
            password: password.into().into_bytes(),
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn password_matches(&self, candidate: &str) -> bool {
        self.password.as_slice().ct_eq(candidate.as_bytes()).into()
    }

    /// Opens a session and returns its token when the password matches.
    pub fn login(&self, candidate: &str) -> Option<String> {
        if !self.password_matches(candidate) {
            return None;
        }
        let token = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, expires| *expires > now);
        sessions.insert(token.clone(), now + self.ttl);
        Some(token)
    }

    pub fn is_valid(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                sessions.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }
}
