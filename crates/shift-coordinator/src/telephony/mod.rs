//! Telephony Adapter (T).
//!
//! Opaque over the wire format: the real transport (DTMF, audio streaming, recording
//! storage) is a separate concern this crate never imports a concrete SDK for. This module
//! only defines the trait boundary and the DTOs the webhook surface in [`crate::server`]
//! deserialises into, plus a [`NullTelephonyAdapter`] test double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CallStartEvent {
    pub call_id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechResultEvent {
    pub call_id: String,
    pub transcript: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DtmfEvent {
    pub call_id: String,
    pub digit: char,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallEndEvent {
    pub call_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundCallRequest {
    pub to: String,
    pub from: String,
    pub initial_play_url: String,
    pub status_callback: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundCallOutcome {
    Answered,
    NoAnswer,
    Busy,
    Error,
}

/// Outbound operations a call-scoped F or O invokes against the telephony provider.
#[async_trait]
pub trait TelephonyAdapter: Send + Sync {
    async fn play_text(&self, call_id: &str, text: &str) -> anyhow::Result<()>;
    async fn play_audio(&self, call_id: &str, audio_url: &str) -> anyhow::Result<()>;
    async fn gather_speech(
        &self,
        call_id: &str,
        timeout: std::time::Duration,
    ) -> anyhow::Result<SpeechResultEvent>;
    async fn gather_dtmf(
        &self,
        call_id: &str,
        num_digits: usize,
        timeout: std::time::Duration,
    ) -> anyhow::Result<String>;
    async fn transfer_to(&self, call_id: &str, e164: &str) -> anyhow::Result<()>;
    async fn hang_up(&self, call_id: &str) -> anyhow::Result<()>;
    async fn place_call(&self, request: OutboundCallRequest) -> anyhow::Result<String>;
}

/// A no-op adapter for integration tests.
#[derive(Default)]
pub struct NullTelephonyAdapter;

#[async_trait]
impl TelephonyAdapter for NullTelephonyAdapter {
    async fn play_text(&self, _call_id: &str, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn play_audio(&self, _call_id: &str, _audio_url: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn gather_speech(
        &self,
        call_id: &str,
        _timeout: std::time::Duration,
    ) -> anyhow::Result<SpeechResultEvent> {
        Ok(SpeechResultEvent {
            call_id: call_id.to_string(),
            transcript: String::new(),
            confidence: 0.0,
        })
    }

    async fn gather_dtmf(
        &self,
        _call_id: &str,
        _num_digits: usize,
        _timeout: std::time::Duration,
    ) -> anyhow::Result<String> {
        Ok(String::new())
    }

    async fn transfer_to(&self, _call_id: &str, _e164: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn hang_up(&self, _call_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn place_call(&self, _request: OutboundCallRequest) -> anyhow::Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
