//! Software backend for OpenPGP-tagged keys.
//!
//! Keys are shared secrets from a [`Keyring`]:
//! - signing is HMAC-SHA256 of the payload under each signer's secret;
//! - encryption seals the payload with AES-256-GCM under a random content
//!   key, and wraps that key for every recipient with the recipient's secret;
//! - without recipients the payload key is derived from the configured
//!   passphrase with PBKDF2-HMAC-SHA256.
//!
//! The written format is described in [`envelope`].
//!
//! Jobs buffer the whole input in memory; armored output holds a base64
//! copy on top. Key derivation and bulk AES run on the blocking pool.

pub mod envelope;
mod primitives;

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::outcome::{codes, CreatedSignature, EncryptionResult, OpError, SigningResult};
use super::{
    CryptoBackend, EncryptJob, InputStream, JobContext, OutputStream, SignEncryptJob, SignJob,
    SignatureMode,
};
use crate::keys::{Key, Keyring, Protocol};
use envelope::{
    CipherBlock, Envelope, SignatureBlock, SymmetricParams, WrappedKey, ENVELOPE_VERSION,
};
use primitives::{KEY_LENGTH, SALT_LENGTH};

/// Default PBKDF2 iteration count for passphrase-derived keys
pub const DEFAULT_PBKDF2_ROUNDS: u32 = 600_000;

/// Upper bound on PBKDF2 iterations, for configuration and for messages.
pub const MAX_PBKDF2_ROUNDS: u32 = 10 * DEFAULT_PBKDF2_ROUNDS;

/// Input is read in chunks of this size; one progress event per chunk.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct LocalOptions {
    /// Passphrase for symmetric encryption (no recipients).
    pub passphrase: Option<String>,
    pub pbkdf2_rounds: u32,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            passphrase: None,
            pbkdf2_rounds: DEFAULT_PBKDF2_ROUNDS,
        }
    }
}

pub struct LocalBackend {
    keyring: Arc<Keyring>,
    options: Arc<LocalOptions>,
}

/// Plaintext recovered by [`LocalBackend::unseal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsealed {
    pub plaintext: Vec<u8>,
    /// Fingerprints of verified signers.
    pub signers: Vec<String>,
    pub was_encrypted: bool,
}

impl LocalBackend {
    pub fn new(keyring: Arc<Keyring>, options: LocalOptions) -> Self {
        Self {
            keyring,
            options: Arc::new(options),
        }
    }

    pub fn registry_entry(keyring: Arc<Keyring>, options: LocalOptions) -> Arc<dyn CryptoBackend> {
        Arc::new(Self::new(keyring, options))
    }

    fn job(&self, armor: bool, text_mode: bool) -> LocalJob {
        LocalJob {
            keyring: self.keyring.clone(),
            options: self.options.clone(),
            armor,
            text_mode,
        }
    }

    /// Decrypt and/or verify a message written by this backend.
    pub fn unseal(&self, data: &[u8]) -> Result<Unsealed, OpError> {
        let envelope = envelope::decode(data).map_err(|e| OpError::new(codes::INV_VALUE, e.to_string()))?;
        match envelope {
            Envelope::Signed {
                payload,
                signatures,
                ..
            } => {
                let plaintext = decode_base64(&payload)?;
                let signers = self.verify(&signatures, &plaintext)?;
                Ok(Unsealed {
                    plaintext,
                    signers,
                    was_encrypted: false,
                })
            }
            Envelope::DetachedSignature { .. } => Err(OpError::new(
                codes::INV_VALUE,
                "Detached signature needs the signed data",
            )),
            Envelope::Encrypted { cipher, .. } => {
                let plaintext = self.decrypt(&cipher)?;
                match envelope::decode(&plaintext) {
                    Ok(Envelope::Signed {
                        payload,
                        signatures,
                        ..
                    }) => {
                        let plaintext = decode_base64(&payload)?;
                        let signers = self.verify(&signatures, &plaintext)?;
                        Ok(Unsealed {
                            plaintext,
                            signers,
                            was_encrypted: true,
                        })
                    }
                    _ => Ok(Unsealed {
                        plaintext,
                        signers: Vec::new(),
                        was_encrypted: true,
                    }),
                }
            }
        }
    }

    /// Verify a detached signature over `data`; returns the signer fingerprints.
    pub fn verify_detached(&self, data: &[u8], signature: &[u8]) -> Result<Vec<String>, OpError> {
        match envelope::decode(signature).map_err(|e| OpError::new(codes::INV_VALUE, e.to_string()))? {
            Envelope::DetachedSignature { signatures, .. } => self.verify(&signatures, data),
            _ => Err(OpError::new(codes::INV_VALUE, "Not a detached signature")),
        }
    }

    fn verify(&self, signatures: &[SignatureBlock], data: &[u8]) -> Result<Vec<String>, OpError> {
        let mut verified = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let key = self
                .keyring
                .by_fingerprint(&signature.fingerprint)
                .and_then(|key| key.secret())
                .ok_or_else(|| {
                    OpError::new(
                        codes::NO_PUBKEY,
                        format!("No key for signature by {}", signature.fingerprint),
                    )
                })?;
            if !primitives::verify_mac(key.as_bytes(), data, &signature.mac) {
                return Err(OpError::new(
                    codes::BAD_SIGNATURE,
                    format!("Bad signature by {}", signature.fingerprint),
                ));
            }
            verified.push(signature.fingerprint.clone());
        }
        Ok(verified)
    }

    fn decrypt(&self, cipher: &CipherBlock) -> Result<Vec<u8>, OpError> {
        let nonce = decode_base64(&cipher.nonce)?;
        let ciphertext = decode_base64(&cipher.ciphertext)?;

        if let Some(params) = &cipher.symmetric {
            let passphrase = self.options.passphrase.as_deref().ok_or_else(|| {
                OpError::new(codes::NO_PASSPHRASE, "A passphrase is required to decrypt")
            })?;
            if params.rounds == 0 || params.rounds > MAX_PBKDF2_ROUNDS {
                return Err(OpError::new(
                    codes::INV_VALUE,
                    format!("Unsupported PBKDF2 iteration count: {}", params.rounds),
                ));
            }
            let salt = decode_base64(&params.salt)?;
            let key = primitives::derive_key(passphrase, &salt, params.rounds);
            return primitives::open(&key, &nonce, &ciphertext)
                .map_err(|_| OpError::new(codes::BAD_PASSPHRASE, "Bad passphrase"));
        }

        for wrapped in &cipher.recipients {
            let Some(secret) = self
                .keyring
                .by_fingerprint(&wrapped.fingerprint)
                .and_then(|key| key.secret())
            else {
                continue;
            };
            let content_key = primitives::open(
                secret.as_bytes(),
                &decode_base64(&wrapped.nonce)?,
                &decode_base64(&wrapped.wrapped)?,
            )
            .map_err(|e| OpError::new(codes::DECRYPT_FAILED, e))?;
            let content_key: [u8; KEY_LENGTH] = content_key
                .try_into()
                .map_err(|_| OpError::new(codes::DECRYPT_FAILED, "Invalid content key"))?;
            return primitives::open(&content_key, &nonce, &ciphertext)
                .map_err(|e| OpError::new(codes::DECRYPT_FAILED, e));
        }

        Err(OpError::new(
            codes::NO_SECKEY,
            "No secret key for any recipient of this message",
        ))
    }
}

impl CryptoBackend for LocalBackend {
    fn protocol(&self) -> Protocol {
        Protocol::OpenPgp
    }

    fn name(&self) -> &str {
        "local"
    }

    fn sign_job(&self, armor: bool, text_mode: bool) -> Option<Box<dyn SignJob>> {
        Some(Box::new(self.job(armor, text_mode)))
    }

    fn encrypt_job(&self, armor: bool, text_mode: bool) -> Option<Box<dyn EncryptJob>> {
        Some(Box::new(self.job(armor, text_mode)))
    }

    fn sign_encrypt_job(&self, armor: bool, text_mode: bool) -> Option<Box<dyn SignEncryptJob>> {
        Some(Box::new(self.job(armor, text_mode)))
    }
}

fn decode_base64(value: &str) -> Result<Vec<u8>, OpError> {
    BASE64
        .decode(value)
        .map_err(|e| OpError::new(codes::INV_VALUE, format!("Malformed message: {}", e)))
}

/// Run CPU-bound work on the blocking pool. Cancellation abandons the
/// result without waiting for the work to finish.
async fn off_runtime<T, F>(ctx: &JobContext, work: F) -> Result<T, OpError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, OpError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    tokio::select! {
        _ = ctx.cancel_token().cancelled() => Err(OpError::canceled()),
        joined = handle => joined.map_err(|e| {
            OpError::new(codes::INTERNAL, format!("Crypto worker failed: {}", e))
        })?,
    }
}

fn general(message: String) -> OpError {
    OpError::new(codes::GENERAL, message)
}

fn io_error(context: &str, err: std::io::Error) -> OpError {
    OpError::new(codes::from_io(&err), format!("{}: {}", context, err))
}

/// Convert CRLF line endings to LF.
fn canonicalize_line_endings(data: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.into_iter().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

struct LocalJob {
    keyring: Arc<Keyring>,
    options: Arc<LocalOptions>,
    armor: bool,
    text_mode: bool,
}

impl LocalJob {
    async fn read_input(&self, input: &mut InputStream, ctx: &JobContext) -> Result<Vec<u8>, OpError> {
        let mut data = Vec::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if ctx.is_canceled() {
                return Err(OpError::canceled());
            }
            let read = input
                .read(&mut buf)
                .await
                .map_err(|e| io_error("Failed to read input", e))?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&buf[..read]);
            ctx.progress("Reading input", data.len() as u64, 0);
        }
        if self.text_mode {
            data = canonicalize_line_endings(data);
        }
        Ok(data)
    }

    async fn write_output(
        &self,
        output: &mut OutputStream,
        envelope: &Envelope,
        ctx: &JobContext,
    ) -> Result<(), OpError> {
        if ctx.is_canceled() {
            return Err(OpError::canceled());
        }
        let bytes = envelope::encode(envelope, self.armor)
            .map_err(|e| OpError::new(codes::INTERNAL, e.to_string()))?;
        let total = bytes.len() as u64;
        ctx.progress("Writing output", 0, total);
        output
            .write_all(&bytes)
            .await
            .map_err(|e| io_error("Failed to write output", e))?;
        output
            .shutdown()
            .await
            .map_err(|e| io_error("Failed to close output", e))?;
        ctx.progress("Writing output", total, total);
        Ok(())
    }

    fn signing_secret(&self, key: &Key) -> Result<[u8; KEY_LENGTH], OpError> {
        if key.protocol != Protocol::OpenPgp {
            return Err(OpError::new(
                codes::UNUSABLE_SECKEY,
                format!("{} is not an OpenPGP key", key.fingerprint),
            ));
        }
        key.secret()
            .or_else(|| {
                self.keyring
                    .by_fingerprint(&key.fingerprint)
                    .and_then(|stored| stored.secret())
            })
            .map(|secret| *secret.as_bytes())
            .ok_or_else(|| {
                OpError::new(
                    codes::NO_SECKEY,
                    format!("No secret key for {}", key.fingerprint),
                )
            })
    }

    fn recipient_secret(&self, key: &Key) -> Option<[u8; KEY_LENGTH]> {
        if key.protocol != Protocol::OpenPgp {
            return None;
        }
        key.secret()
            .or_else(|| {
                self.keyring
                    .by_fingerprint(&key.fingerprint)
                    .and_then(|stored| stored.secret())
            })
            .map(|secret| *secret.as_bytes())
    }

    fn sign_data(
        &self,
        signers: &[Key],
        data: &[u8],
        ctx: &JobContext,
    ) -> Result<Vec<SignatureBlock>, OpError> {
        if signers.is_empty() {
            return Err(OpError::new(codes::INV_VALUE, "No signers given"));
        }
        let total = signers.len() as u64;
        let mut blocks = Vec::with_capacity(signers.len());
        for (index, signer) in signers.iter().enumerate() {
            if ctx.is_canceled() {
                return Err(OpError::canceled());
            }
            let secret = self.signing_secret(signer)?;
            let mac = primitives::mac(&secret, data).map_err(|e| OpError::new(codes::GENERAL, e))?;
            blocks.push(SignatureBlock {
                fingerprint: signer.fingerprint.clone(),
                user_id: signer.user_id.clone(),
                created: chrono::Utc::now().to_rfc3339(),
                mac,
            });
            ctx.progress("Signing", index as u64 + 1, total);
        }
        Ok(blocks)
    }

    async fn encrypt_data(
        &self,
        recipients: &[Key],
        plaintext: Vec<u8>,
        ctx: &JobContext,
    ) -> Result<Envelope, EncryptionResult> {
        if ctx.is_canceled() {
            return Err(EncryptionResult::failed(OpError::canceled()));
        }
        ctx.progress("Encrypting", 0, 1);

        let cipher = if recipients.is_empty() {
            let passphrase = self.options.passphrase.clone().ok_or_else(|| {
                EncryptionResult::failed(OpError::new(
                    codes::NO_PASSPHRASE,
                    "Symmetric encryption requires a passphrase",
                ))
            })?;
            let rounds = self.options.pbkdf2_rounds;
            off_runtime(ctx, move || {
                let salt = primitives::random_bytes::<SALT_LENGTH>();
                let key = primitives::derive_key(&passphrase, &salt, rounds);
                let (nonce, ciphertext) = primitives::seal(&key, &plaintext).map_err(general)?;
                Ok(CipherBlock {
                    nonce: BASE64.encode(nonce),
                    ciphertext: BASE64.encode(ciphertext),
                    recipients: Vec::new(),
                    symmetric: Some(SymmetricParams {
                        salt: BASE64.encode(salt),
                        rounds,
                    }),
                })
            })
            .await
            .map_err(EncryptionResult::failed)?
        } else {
            let mut usable = Vec::with_capacity(recipients.len());
            let mut invalid = Vec::new();
            for recipient in recipients {
                match self.recipient_secret(recipient) {
                    Some(secret) => usable.push((recipient.fingerprint.clone(), secret)),
                    None => invalid.push(recipient.fingerprint.clone()),
                }
            }
            if !invalid.is_empty() {
                return Err(EncryptionResult::new(
                    OpError::new(
                        codes::UNUSABLE_PUBKEY,
                        format!("Unusable recipient(s): {}", invalid.join(", ")),
                    ),
                    invalid,
                ));
            }

            off_runtime(ctx, move || {
                let content_key = primitives::random_bytes::<KEY_LENGTH>();
                let (nonce, ciphertext) =
                    primitives::seal(&content_key, &plaintext).map_err(general)?;
                let mut wrapped_keys = Vec::with_capacity(usable.len());
                for (fingerprint, secret) in usable {
                    let (wrap_nonce, wrapped) =
                        primitives::seal(&secret, &content_key).map_err(general)?;
                    wrapped_keys.push(WrappedKey {
                        fingerprint,
                        nonce: BASE64.encode(wrap_nonce),
                        wrapped: BASE64.encode(wrapped),
                    });
                }
                Ok(CipherBlock {
                    nonce: BASE64.encode(nonce),
                    ciphertext: BASE64.encode(ciphertext),
                    recipients: wrapped_keys,
                    symmetric: None,
                })
            })
            .await
            .map_err(EncryptionResult::failed)?
        };

        ctx.progress("Encrypting", 1, 1);
        Ok(Envelope::Encrypted {
            version: ENVELOPE_VERSION,
            cipher,
        })
    }

    async fn sign(
        &self,
        signers: &[Key],
        mut input: InputStream,
        mut output: OutputStream,
        mode: SignatureMode,
        ctx: &JobContext,
    ) -> Result<Vec<SignatureBlock>, OpError> {
        let data = self.read_input(&mut input, ctx).await?;
        let signatures = self.sign_data(signers, &data, ctx)?;
        let envelope = match mode {
            SignatureMode::Normal => Envelope::Signed {
                version: ENVELOPE_VERSION,
                payload: BASE64.encode(&data),
                signatures: signatures.clone(),
            },
            SignatureMode::Detached => Envelope::DetachedSignature {
                version: ENVELOPE_VERSION,
                signatures: signatures.clone(),
            },
        };
        self.write_output(&mut output, &envelope, ctx).await?;
        Ok(signatures)
    }
}

fn created_signatures(blocks: &[SignatureBlock]) -> Vec<CreatedSignature> {
    blocks
        .iter()
        .map(|block| CreatedSignature {
            fingerprint: block.fingerprint.clone(),
            created: block.created.clone(),
        })
        .collect()
}

#[async_trait]
impl SignJob for LocalJob {
    async fn run(
        self: Box<Self>,
        signers: Vec<Key>,
        input: InputStream,
        output: OutputStream,
        mode: SignatureMode,
        ctx: JobContext,
    ) -> SigningResult {
        match self.sign(&signers, input, output, mode, &ctx).await {
            Ok(blocks) => SigningResult::new(OpError::none(), created_signatures(&blocks)),
            Err(error) => {
                tracing::debug!("Local signing failed: {}", error);
                SigningResult::failed(error)
            }
        }
    }
}

#[async_trait]
impl EncryptJob for LocalJob {
    async fn run(
        self: Box<Self>,
        recipients: Vec<Key>,
        mut input: InputStream,
        mut output: OutputStream,
        ctx: JobContext,
    ) -> EncryptionResult {
        let data = match self.read_input(&mut input, &ctx).await {
            Ok(data) => data,
            Err(error) => return EncryptionResult::failed(error),
        };
        let envelope = match self.encrypt_data(&recipients, data, &ctx).await {
            Ok(envelope) => envelope,
            Err(result) => return result,
        };
        match self.write_output(&mut output, &envelope, &ctx).await {
            Ok(()) => EncryptionResult::default(),
            Err(error) => EncryptionResult::failed(error),
        }
    }
}

#[async_trait]
impl SignEncryptJob for LocalJob {
    async fn run(
        self: Box<Self>,
        signers: Vec<Key>,
        recipients: Vec<Key>,
        mut input: InputStream,
        mut output: OutputStream,
        ctx: JobContext,
    ) -> (SigningResult, EncryptionResult) {
        let data = match self.read_input(&mut input, &ctx).await {
            Ok(data) => data,
            Err(error) => {
                return (
                    SigningResult::failed(error.clone()),
                    EncryptionResult::failed(error),
                )
            }
        };

        let signatures = match self.sign_data(&signers, &data, &ctx) {
            Ok(signatures) => signatures,
            Err(error) => return (SigningResult::failed(error), EncryptionResult::default()),
        };
        let signing = SigningResult::new(OpError::none(), created_signatures(&signatures));

        let signed = Envelope::Signed {
            version: ENVELOPE_VERSION,
            payload: BASE64.encode(&data),
            signatures,
        };
        let inner = match envelope::encode(&signed, false) {
            Ok(inner) => inner,
            Err(e) => {
                let error = OpError::new(codes::INTERNAL, e.to_string());
                return (signing, EncryptionResult::failed(error));
            }
        };

        let envelope = match self.encrypt_data(&recipients, inner, &ctx).await {
            Ok(envelope) => envelope,
            Err(result) => return (signing, result),
        };
        match self.write_output(&mut output, &envelope, &ctx).await {
            Ok(()) => (signing, EncryptionResult::default()),
            Err(error) => (
                SigningResult::failed(error.clone()),
                EncryptionResult::failed(error),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::events::JobEvent;
    use crate::keys::KeySecret;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        backend: LocalBackend,
        alice: Key,
        bob: Key,
    }

    fn harness(passphrase: Option<&str>) -> Harness {
        let alice = Key::from_secret(
            "alice@example.org",
            Protocol::OpenPgp,
            KeySecret::from_bytes([1u8; 32]),
        );
        let bob = Key::from_secret(
            "bob@example.org",
            Protocol::OpenPgp,
            KeySecret::from_bytes([2u8; 32]),
        );
        let keyring = Arc::new(Keyring::from_keys(vec![alice.clone(), bob.clone()]));
        let backend = LocalBackend::new(
            keyring,
            LocalOptions {
                passphrase: passphrase.map(str::to_string),
                pbkdf2_rounds: 1_000,
            },
        );
        Harness { backend, alice, bob }
    }

    fn context() -> (JobContext, mpsc::UnboundedReceiver<JobEvent>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (JobContext::new(tx, cancel.clone()), rx, cancel)
    }

    fn input(data: &[u8]) -> InputStream {
        Box::new(std::io::Cursor::new(data.to_vec()))
    }

    /// Output stream plus the reading end that yields what the job wrote.
    fn output() -> (OutputStream, tokio::io::DuplexStream) {
        let (writer, reader) = tokio::io::duplex(1 << 20);
        (Box::new(writer), reader)
    }

    async fn written(mut reader: tokio::io::DuplexStream) -> Vec<u8> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn sign_job_writes_verifiable_armored_message() {
        let h = harness(None);
        let (ctx, mut events, _) = context();
        let (out, reader) = output();

        let job = h.backend.sign_job(true, false).unwrap();
        let result = job
            .run(vec![h.alice.without_secret()], input(b"hello"), out, SignatureMode::Normal, ctx)
            .await;

        assert!(!result.error().is_err());
        assert_eq!(result.signatures().len(), 1);
        let message = written(reader).await;
        assert!(message.starts_with(envelope::ARMOR_BEGIN.as_bytes()));

        let unsealed = h.backend.unseal(&message).unwrap();
        assert_eq!(unsealed.plaintext, b"hello");
        assert_eq!(unsealed.signers, vec![h.alice.fingerprint.clone()]);
        assert!(!unsealed.was_encrypted);

        let mut saw_progress = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, JobEvent::Progress { .. }) {
                saw_progress = true;
            }
        }
        assert!(saw_progress);
    }

    #[tokio::test]
    async fn detached_signature_covers_only_original_data() {
        let h = harness(None);
        let (ctx, _events, _) = context();
        let (out, reader) = output();

        let job = h.backend.sign_job(false, false).unwrap();
        let result = job
            .run(vec![h.bob.clone()], input(b"contract"), out, SignatureMode::Detached, ctx)
            .await;
        assert!(!result.error().is_err());

        let signature = written(reader).await;
        assert_eq!(
            h.backend.verify_detached(b"contract", &signature).unwrap(),
            vec![h.bob.fingerprint.clone()]
        );
        let err = h.backend.verify_detached(b"c0ntract", &signature).unwrap_err();
        assert_eq!(err.code(), codes::BAD_SIGNATURE);
    }

    #[tokio::test]
    async fn signer_without_secret_reports_no_seckey() {
        let h = harness(None);
        let (ctx, _events, _) = context();
        let (out, _reader) = output();
        let stranger = Key::public("DEADBEEFDEADBEEF", "stranger", Protocol::OpenPgp);

        let job = h.backend.sign_job(true, false).unwrap();
        let result = job
            .run(vec![stranger], input(b"data"), out, SignatureMode::Normal, ctx)
            .await;
        assert_eq!(result.error().code(), codes::NO_SECKEY);
    }

    #[tokio::test]
    async fn encrypt_job_roundtrips_for_recipient() {
        let h = harness(None);
        let (ctx, _events, _) = context();
        let (out, reader) = output();

        let job = h.backend.encrypt_job(false, false).unwrap();
        let result = job
            .run(vec![h.bob.without_secret()], input(b"for bob"), out, ctx)
            .await;
        assert!(!result.error().is_err());

        let unsealed = h.backend.unseal(&written(reader).await).unwrap();
        assert_eq!(unsealed.plaintext, b"for bob");
        assert!(unsealed.was_encrypted);
        assert!(unsealed.signers.is_empty());
    }

    #[tokio::test]
    async fn unusable_recipients_are_listed() {
        let h = harness(None);
        let (ctx, _events, _) = context();
        let (out, _reader) = output();
        let smime = Key::generate("carol@example.org", Protocol::Smime);

        let job = h.backend.encrypt_job(true, false).unwrap();
        let result = job
            .run(vec![h.bob.clone(), smime.clone()], input(b"x"), out, ctx)
            .await;
        assert_eq!(result.error().code(), codes::UNUSABLE_PUBKEY);
        assert_eq!(result.invalid_recipients(), &[smime.fingerprint]);
    }

    #[tokio::test]
    async fn symmetric_encryption_needs_passphrase() {
        let h = harness(None);
        let (ctx, _events, _) = context();
        let (out, _reader) = output();
        let job = h.backend.encrypt_job(true, false).unwrap();
        let result = job.run(Vec::new(), input(b"x"), out, ctx).await;
        assert_eq!(result.error().code(), codes::NO_PASSPHRASE);

        let h = harness(Some("correct horse"));
        let (ctx, _events, _) = context();
        let (out, reader) = output();
        let job = h.backend.encrypt_job(true, false).unwrap();
        let result = job.run(Vec::new(), input(b"symmetric"), out, ctx).await;
        assert!(!result.error().is_err());
        let unsealed = h.backend.unseal(&written(reader).await).unwrap();
        assert_eq!(unsealed.plaintext, b"symmetric");
    }

    #[tokio::test]
    async fn sign_encrypt_job_reports_both_halves() {
        let h = harness(None);
        let (ctx, _events, _) = context();
        let (out, reader) = output();

        let job = h.backend.sign_encrypt_job(true, false).unwrap();
        let (signing, encryption) = job
            .run(
                vec![h.alice.clone()],
                vec![h.bob.without_secret()],
                input(b"signed and sealed"),
                out,
                ctx,
            )
            .await;
        assert!(!signing.error().is_err());
        assert!(!encryption.error().is_err());

        let unsealed = h.backend.unseal(&written(reader).await).unwrap();
        assert_eq!(unsealed.plaintext, b"signed and sealed");
        assert_eq!(unsealed.signers, vec![h.alice.fingerprint.clone()]);
        assert!(unsealed.was_encrypted);
    }

    #[tokio::test]
    async fn cancelled_job_reports_cancellation_on_both_halves() {
        let h = harness(None);
        let (ctx, _events, cancel) = context();
        let (out, _reader) = output();
        cancel.cancel();

        let job = h.backend.sign_encrypt_job(true, false).unwrap();
        let (signing, encryption) = job
            .run(vec![h.alice.clone()], vec![h.bob.clone()], input(b"x"), out, ctx)
            .await;
        assert!(signing.error().is_canceled());
        assert!(encryption.error().is_canceled());
    }

    #[tokio::test]
    async fn oversized_iteration_count_is_rejected() {
        let h = harness(Some("pass"));
        let (ctx, _events, _) = context();
        let (out, reader) = output();
        let job = h.backend.encrypt_job(false, false).unwrap();
        let result = job.run(Vec::new(), input(b"secret"), out, ctx).await;
        assert!(!result.error().is_err());

        let mut message = envelope::decode(&written(reader).await).unwrap();
        let Envelope::Encrypted { cipher, .. } = &mut message else {
            panic!("expected an encrypted envelope");
        };
        cipher.symmetric.as_mut().unwrap().rounds = u32::MAX;
        let tampered = envelope::encode(&message, false).unwrap();

        let err = h.backend.unseal(&tampered).unwrap_err();
        assert_eq!(err.code(), codes::INV_VALUE);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn key_derivation_does_not_stall_the_runtime() {
        let keyring = Arc::new(Keyring::from_keys(Vec::new()));
        let backend = LocalBackend::new(
            keyring,
            LocalOptions {
                passphrase: Some("slow".to_string()),
                pbkdf2_rounds: 100_000,
            },
        );
        let (ctx, _events, _) = context();
        let (out, _reader) = output();
        let job = backend.encrypt_job(false, false).unwrap();
        let mut run = tokio::spawn(job.run(Vec::new(), input(b"data"), out, ctx));

        let mut worst = std::time::Duration::ZERO;
        let result = loop {
            let before = std::time::Instant::now();
            tokio::select! {
                result = &mut run => break result.unwrap(),
                _ = tokio::time::sleep(std::time::Duration::from_millis(1)) => {}
            }
            worst = worst.max(before.elapsed());
        };
        assert!(!result.error().is_err());
        assert!(worst < std::time::Duration::from_millis(100), "stalled for {:?}", worst);
    }

    #[tokio::test]
    async fn cancellation_abandons_key_derivation() {
        let keyring = Arc::new(Keyring::from_keys(Vec::new()));
        let backend = LocalBackend::new(
            keyring,
            LocalOptions {
                passphrase: Some("slow".to_string()),
                pbkdf2_rounds: 200_000,
            },
        );
        let (ctx, mut events, cancel) = context();
        let (out, _reader) = output();
        let job = backend.encrypt_job(false, false).unwrap();
        let run = tokio::spawn(job.run(Vec::new(), input(b"data"), out, ctx));

        while let Some(event) = events.recv().await {
            if matches!(&event, JobEvent::Progress { message, .. } if message == "Encrypting") {
                break;
            }
        }
        cancel.cancel();
        let result = run.await.unwrap();
        assert!(result.error().is_canceled());
    }

    #[test]
    fn text_mode_strips_carriage_returns() {
        assert_eq!(
            canonicalize_line_endings(b"a\r\nb\rc\r\n".to_vec()),
            b"a\nb\rc\n".to_vec()
        );
    }
}
