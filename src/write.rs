//! Persistence collaborator: the pipeline's sole side-effecting exit.
//!
//! Datasets are serialized deterministically and written atomically (tmp
//! file, then rename) so a crashed run never leaves a half-written artifact.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

const GITATTRIBUTES: &str = "*.json -diff linguist-generated=true\n";

/// Serialize `data` and write it under `out_dir/filename`, creating the
/// directory if missing.
pub fn write_dataset<T: Serialize>(out_dir: &Path, filename: &str, data: &T) -> Result<PathBuf> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    ensure_gitattributes(out_dir)?;

    let path = out_dir.join(filename);
    let tmp_path = out_dir.join(format!(".{filename}.tmp"));

    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;
    serde_json::to_writer_pretty(&mut tmp, data)
        .with_context(|| format!("serializing {filename}"))?;
    // trailing newline keeps the artifact diff-friendly for manual inspection
    tmp.write_all(b"\n")
        .with_context(|| format!("finishing {}", tmp_path.display()))?;

    fs::rename(&tmp_path, &path).with_context(|| {
        format!("renaming {} -> {}", tmp_path.display(), path.display())
    })?;
    Ok(path)
}

/// Mark the output directory's artifacts as generated so routine diffing
/// skips them. Written once; an existing file is left alone.
fn ensure_gitattributes(out_dir: &Path) -> Result<()> {
    let path = out_dir.join(".gitattributes");
    if !path.exists() {
        fs::write(&path, GITATTRIBUTES)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
