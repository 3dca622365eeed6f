//! Scripted collaborators for pipeline tests
#![allow(dead_code)] // Not every test file uses every helper

pub mod mock_transport;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ahash::AHashMap;
use async_trait::async_trait;
use mailmerge_common::Recipient;
use mailmerge_dispatch::{AccessToken, TokenError, TokenSource};

pub use mock_transport::MockTransport;

pub fn recipients(emails: &[&str]) -> Vec<Recipient> {
    emails
        .iter()
        .map(|email| {
            let name = email.split('@').next().unwrap_or_default().to_string();
            Recipient::new(*email, AHashMap::from_iter([("name".to_string(), name)]))
        })
        .collect()
}

/// Hands out `token-N`, counting acquisitions
#[derive(Default)]
pub struct CountingTokens {
    acquired: AtomicUsize,
}

impl CountingTokens {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for CountingTokens {
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        let count = self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new(format!("token-{count}")))
    }
}

/// Never produces a token
pub struct NoTokens;

#[async_trait]
impl TokenSource for NoTokens {
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        Err(TokenError::Unavailable("consent revoked".to_string()))
    }
}
