// src/main.rs

use anyhow::{Context, Result};
use futures_util::future::try_join_all;
use serde_json::json;
use std::collections::HashSet;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use trackline::digest::{sha256_bytes, sha256_file};
use trackline::limiter::SpeedLimiter;
use trackline::logging::init_logging;
use trackline::prelude::*;

const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar";
const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.empty.v1+json";
const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
const REFERENCE: &str = "latest";
// Slow enough for the progress bars to be worth watching.
const INGEST_RATE: u64 = 4 * 1024 * 1024;
const GENERATED_SIZES: [usize; 3] = [3 * 1024 * 1024, 7 * 1024 * 1024 + 123, 0];

enum Source {
    File(PathBuf),
    Memory(Vec<u8>),
}

struct Blob {
    desc: Descriptor,
    source: Source,
}

#[tokio::main]
async fn main() -> Result<()> {
    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    let interactive = io::stdout().is_terminal();

    // Keep log lines out of the tracked region.
    let log_path = std::env::temp_dir().join("trackline.log");
    init_logging(2, interactive.then_some(log_path.as_path()))?;

    let mut blobs = if paths.is_empty() {
        generated_blobs()
    } else {
        file_blobs(&paths).await?
    };
    let config = b"{}".to_vec();
    blobs.push(Blob {
        desc: Descriptor::new(CONFIG_MEDIA_TYPE, sha256_bytes(&config), config.len() as u64),
        source: Source::Memory(config),
    });
    let blobs = dedup(blobs);
    let (manifest_desc, manifest) = build_manifest(&blobs)?;

    let store = MemoryStore::with_limiter(SpeedLimiter::new(INGEST_RATE));
    let printer = Printer::stdout();

    match Manager::new(io::stdout()) {
        Ok(manager) => {
            let tracked = wrap(store, manager, Prompts::push());
            let pushed = push_tracked(&tracked, &blobs, &manifest_desc, &manifest).await;
            // The terminal is handed back even when a push failed; the push
            // error takes precedence over any rendering fault.
            let stopped = tracked.stop().await;
            pushed?;
            stopped?;
        }
        Err(ManagerError::Console(ConsoleError::NotInteractive)) => {
            tracing::info!("stdout is not a terminal, falling back to plain output");
            push_plain(&store, &printer, &blobs, &manifest_desc, &manifest).await?;
        }
        Err(e) => return Err(e.into()),
    }

    printer.println(&format!("Pushed {REFERENCE}"))?;
    printer.println(&format!("Digest: {}", manifest_desc.digest))?;
    Ok(())
}

fn generated_blobs() -> Vec<Blob> {
    GENERATED_SIZES
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            let data: Vec<u8> = (0..size).map(|b| ((b * 31 + i) % 251) as u8).collect();
            let desc = Descriptor::new(LAYER_MEDIA_TYPE, sha256_bytes(&data), size as u64)
                .with_title(format!("layer-{}.bin", i + 1));
            Blob {
                desc,
                source: Source::Memory(data),
            }
        })
        .collect()
}

async fn file_blobs(paths: &[PathBuf]) -> Result<Vec<Blob>> {
    let mut blobs = Vec::with_capacity(paths.len());
    for path in paths {
        let (digest, size) = sha256_file(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        blobs.push(Blob {
            desc: Descriptor::new(LAYER_MEDIA_TYPE, digest, size).with_title(title),
            source: Source::File(path.clone()),
        });
    }
    Ok(blobs)
}

/// Identical content is pushed once.
fn dedup(blobs: Vec<Blob>) -> Vec<Blob> {
    let mut seen = HashSet::new();
    blobs
        .into_iter()
        .filter(|blob| seen.insert(blob.desc.digest.clone()))
        .collect()
}

fn build_manifest(blobs: &[Blob]) -> Result<(Descriptor, Vec<u8>)> {
    let (config, layers): (Vec<&Blob>, Vec<&Blob>) = blobs
        .iter()
        .partition(|blob| blob.desc.media_type == CONFIG_MEDIA_TYPE);
    let config = config
        .first()
        .map(|blob| &blob.desc)
        .context("manifest config is missing")?;
    let layers: Vec<&Descriptor> = layers.iter().map(|blob| &blob.desc).collect();

    let manifest = serde_json::to_vec_pretty(&json!({
        "schemaVersion": 2,
        "mediaType": MANIFEST_MEDIA_TYPE,
        "config": config,
        "layers": layers,
    }))?;
    let desc = Descriptor::new(MANIFEST_MEDIA_TYPE, sha256_bytes(&manifest), manifest.len() as u64);
    Ok((desc, manifest))
}

type Reader<'a> = Box<dyn tokio::io::AsyncRead + Send + Unpin + 'a>;

async fn open(blob: &Blob) -> Result<Reader<'_>> {
    let reader: Reader<'_> = match &blob.source {
        Source::File(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        Source::Memory(data) => Box::new(&data[..]),
    };
    Ok(reader)
}

async fn push_tracked<T: Target>(
    tracked: &TrackedStore<T>,
    blobs: &[Blob],
    manifest_desc: &Descriptor,
    manifest: &[u8],
) -> Result<()> {
    try_join_all(blobs.iter().map(|blob| async move {
        if tracked.exists(&blob.desc).await? {
            tracked.report_exists(&blob.desc).await?;
            return Ok::<_, anyhow::Error>(());
        }
        let mut content = open(blob).await?;
        tracked.push(&blob.desc, &mut content).await?;
        Ok(())
    }))
    .await?;

    tracked
        .push_reference(manifest_desc, &mut &manifest[..], REFERENCE)
        .await?;
    tracked
        .report_tagged(&manifest_desc.clone().with_title(REFERENCE))
        .await?;
    Ok(())
}

async fn push_plain(
    store: &MemoryStore,
    printer: &Printer,
    blobs: &[Blob],
    manifest_desc: &Descriptor,
    manifest: &[u8],
) -> Result<()> {
    let prompts = Prompts::push();
    try_join_all(blobs.iter().map(|blob| {
        let prompts = &prompts;
        async move {
            if store.exists(&blob.desc).await? {
                printer.status(&prompts.exists, &blob.desc)?;
                return Ok::<_, anyhow::Error>(());
            }
            printer.status(&prompts.action, &blob.desc)?;
            let mut content = open(blob).await?;
            store.push(&blob.desc, &mut content).await?;
            printer.status(&prompts.done, &blob.desc)?;
            Ok(())
        }
    }))
    .await?;

    printer.status(&prompts.action, manifest_desc)?;
    store
        .push_reference(manifest_desc, &mut &manifest[..], REFERENCE)
        .await?;
    printer.status(&prompts.tagged, &manifest_desc.clone().with_title(REFERENCE))?;
    Ok(())
}
