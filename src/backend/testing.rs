//! Scripted backend for tests: replays fixed outcomes instead of doing crypto.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::outcome::{EncryptionResult, OpError, SigningResult};
use super::{
    BackendFactory, CryptoBackend, EncryptJob, InputStream, JobContext, OutputStream,
    SignEncryptJob, SignJob, SignatureMode,
};
use crate::keys::{Key, Protocol};

/// What a scripted job does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub signing: OpError,
    pub encryption: OpError,
    /// Number of progress events emitted before finishing.
    pub progress_steps: u64,
    /// Block until the job is cancelled, then report cancellation.
    pub wait_for_cancel: bool,
}

impl Script {
    pub fn signing_error(error: OpError) -> Self {
        Self {
            signing: error,
            ..Self::default()
        }
    }

    pub fn encryption_error(error: OpError) -> Self {
        Self {
            encryption: error,
            ..Self::default()
        }
    }

    /// Copy input to output after emitting progress; `true` if cancelled.
    async fn play(&self, mut input: InputStream, mut output: OutputStream, ctx: &JobContext) -> bool {
        for step in 1..=self.progress_steps {
            ctx.progress("Working", step, self.progress_steps);
            tokio::task::yield_now().await;
        }
        if self.wait_for_cancel {
            ctx.cancel_token().cancelled().await;
        }
        if ctx.is_canceled() {
            return true;
        }
        let mut data = Vec::new();
        let _ = input.read_to_end(&mut data).await;
        let _ = output.write_all(&data).await;
        let _ = output.shutdown().await;
        false
    }
}

pub struct ScriptedBackend {
    protocol: Protocol,
    name: String,
    script: Script,
    sign_encrypt_supported: bool,
}

impl ScriptedBackend {
    pub fn new(protocol: Protocol, script: Script) -> Self {
        Self {
            protocol,
            name: "scripted".to_string(),
            script,
            sign_encrypt_supported: true,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn without_sign_encrypt(mut self) -> Self {
        self.sign_encrypt_supported = false;
        self
    }
}

/// Factory holding a single scripted OpenPGP backend.
pub fn factory(script: Script) -> Arc<BackendFactory> {
    Arc::new(BackendFactory::new().with(Arc::new(ScriptedBackend::new(Protocol::OpenPgp, script))))
}

struct ScriptedJob {
    script: Script,
}

impl CryptoBackend for ScriptedBackend {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sign_job(&self, _armor: bool, _text_mode: bool) -> Option<Box<dyn SignJob>> {
        Some(Box::new(ScriptedJob {
            script: self.script.clone(),
        }))
    }

    fn encrypt_job(&self, _armor: bool, _text_mode: bool) -> Option<Box<dyn EncryptJob>> {
        Some(Box::new(ScriptedJob {
            script: self.script.clone(),
        }))
    }

    fn sign_encrypt_job(&self, _armor: bool, _text_mode: bool) -> Option<Box<dyn SignEncryptJob>> {
        if !self.sign_encrypt_supported {
            return None;
        }
        Some(Box::new(ScriptedJob {
            script: self.script.clone(),
        }))
    }
}

#[async_trait]
impl SignJob for ScriptedJob {
    async fn run(
        self: Box<Self>,
        _signers: Vec<Key>,
        input: InputStream,
        output: OutputStream,
        _mode: SignatureMode,
        ctx: JobContext,
    ) -> SigningResult {
        if self.script.play(input, output, &ctx).await {
            return SigningResult::failed(OpError::canceled());
        }
        SigningResult::new(self.script.signing.clone(), Vec::new())
    }
}

#[async_trait]
impl EncryptJob for ScriptedJob {
    async fn run(
        self: Box<Self>,
        _recipients: Vec<Key>,
        input: InputStream,
        output: OutputStream,
        ctx: JobContext,
    ) -> EncryptionResult {
        if self.script.play(input, output, &ctx).await {
            return EncryptionResult::failed(OpError::canceled());
        }
        EncryptionResult::new(self.script.encryption.clone(), Vec::new())
    }
}

#[async_trait]
impl SignEncryptJob for ScriptedJob {
    async fn run(
        self: Box<Self>,
        _signers: Vec<Key>,
        _recipients: Vec<Key>,
        input: InputStream,
        output: OutputStream,
        ctx: JobContext,
    ) -> (SigningResult, EncryptionResult) {
        if self.script.play(input, output, &ctx).await {
            return (
                SigningResult::failed(OpError::canceled()),
                EncryptionResult::failed(OpError::canceled()),
            );
        }
        (
            SigningResult::new(self.script.signing.clone(), Vec::new()),
            EncryptionResult::new(self.script.encryption.clone(), Vec::new()),
        )
    }
}
