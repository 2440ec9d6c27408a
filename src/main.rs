//! seal-files - command line entry point
//!
//! Builds one sign/encrypt task per file, runs them as a collection and
//! prints each result.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use file_sealer::backend::local::LocalBackend;
use file_sealer::backend::BackendFactory;
use file_sealer::cli::{output_path_for, Cli, Command, OpenArgs, SealArgs};
use file_sealer::config::Config;
use file_sealer::keys::{Keyring, Protocol};
use file_sealer::task::{CollectionEvent, SignEncryptFilesTask, TaskCollection};
use file_sealer::util::strip_markup;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr; stdout carries results and opened plaintext.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_sealer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    debug!("Loaded configuration: {:?}", config);
    let mut keyring = Keyring::load(&config.keyring_dir).await?;

    match cli.command {
        Command::Seal(args) => seal(args, &config, keyring).await,
        Command::Open(args) => open(args, &config, keyring).await,
        Command::GenKey { user_id, smime } => {
            let protocol = if smime {
                Protocol::Smime
            } else {
                Protocol::OpenPgp
            };
            let key = keyring.generate(&user_id, protocol).await?;
            println!("{}", key);
            Ok(ExitCode::SUCCESS)
        }
        Command::ListKeys => {
            for key in keyring.keys() {
                let marker = if key.has_secret() { "sec" } else { "pub" };
                println!("{} {}", marker, key);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn factory_for(keyring: Arc<Keyring>, config: &Config) -> Arc<BackendFactory> {
    let factory = BackendFactory::new().with(LocalBackend::registry_entry(
        keyring,
        config.local_options(),
    ));
    for info in factory.list() {
        debug!("Registered {} backend '{}'", info.protocol, info.name);
    }
    Arc::new(factory)
}

async fn seal(args: SealArgs, config: &Config, keyring: Keyring) -> anyhow::Result<ExitCode> {
    let signers = args
        .signers
        .iter()
        .map(|query| keyring.resolve(query))
        .collect::<Result<Vec<_>, _>>()?;
    let recipients = args
        .recipients
        .iter()
        .map(|query| keyring.resolve(query).map(|key| key.without_secret()))
        .collect::<Result<Vec<_>, _>>()?;

    let factory = factory_for(Arc::new(keyring), config);
    let armor = config.ascii_armor && !args.binary;
    let remove_input = args.remove_input || config.remove_input;

    let mut collection = TaskCollection::new();
    for file in &args.files {
        let mut task = SignEncryptFilesTask::new(factory.clone());
        task.set_input_file_name(file)?;
        task.set_output_file_name(output_path_for(file, args.detached, armor))?;
        task.set_signers(signers.clone())?;
        task.set_recipients(recipients.clone())?;
        task.set_sign(args.sign())?;
        task.set_encrypt(args.encrypt())?;
        task.set_ascii_armor(armor)?;
        task.set_detached_signature(args.detached)?;
        task.set_remove_input_file_on_success(remove_input)?;
        collection.add(Box::new(task));
    }

    let mut events = collection.start_all().await?;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CollectionEvent::Started { label, tag, .. }) => {
                    info!("{} [{}] started", label, tag);
                }
                Some(CollectionEvent::Progress { message, current, total, .. }) => {
                    debug!("{}: {}/{}", message, current, total);
                }
                Some(CollectionEvent::Result { result, .. }) => {
                    println!("{}", strip_markup(&result.overview()));
                    let details = strip_markup(&result.details());
                    if result.has_error() && !details.is_empty() {
                        println!("    {}", details);
                    }
                }
                Some(CollectionEvent::Done) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling running tasks");
                collection.cancel_all();
            }
        }
    }

    if collection.error_occurred().await {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn open(args: OpenArgs, config: &Config, keyring: Keyring) -> anyhow::Result<ExitCode> {
    let backend = Arc::new(LocalBackend::new(Arc::new(keyring), config.local_options()));
    let data = read(&args.file).await?;

    if let Some(signature) = &args.signature {
        let signature = read(signature).await?;
        return match backend.verify_detached(&data, &signature) {
            Ok(signers) => {
                for signer in signers {
                    println!("Good signature by {}", signer);
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                println!("Verification failed: {}", e);
                Ok(ExitCode::from(1))
            }
        };
    }

    let unsealing = tokio::task::spawn_blocking(move || backend.unseal(&data));
    let unsealed = match unsealing.await? {
        Ok(unsealed) => unsealed,
        Err(e) => {
            eprintln!("Cannot open {}: {}", args.file.display(), e);
            return Ok(ExitCode::from(1));
        }
    };
    for signer in &unsealed.signers {
        info!("Good signature by {}", signer);
    }
    match &args.output {
        Some(path) => tokio::fs::write(path, &unsealed.plaintext)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&unsealed.plaintext).await?;
            stdout.flush().await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
