use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tonewell_storage::asset_dir::PrebuiltAssetDir;

struct Layout {
    base: PathBuf,
    tones: PathBuf,
}

impl Drop for Layout {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.base);
    }
}

fn layout(name: &str) -> Layout {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("tonewell-assets-{name}-{suffix}"));
    let tones = base.join("tones");
    fs::create_dir_all(tones.join("previews")).unwrap();
    fs::write(tones.join("Root_256_preview.wav"), b"RIFF").unwrap();
    fs::write(tones.join("previews").join("Sun.wav"), b"RIFF").unwrap();
    fs::write(base.join("secret.env"), b"SECRET_KEY=x").unwrap();
    Layout { base, tones }
}

#[test]
fn at_assets_01_plain_and_nested_names_resolve() {
    let l = layout("plain");
    let dir = PrebuiltAssetDir::new(l.tones.clone());
    let root = l.tones.canonicalize().unwrap();
    assert_eq!(
        dir.resolve("Root_256_preview.wav"),
        Some(root.join("Root_256_preview.wav"))
    );
    assert_eq!(
        dir.resolve("previews/Sun.wav"),
        Some(root.join("previews").join("Sun.wav"))
    );
}

#[test]
fn at_assets_02_traversal_is_rejected() {
    let l = layout("traversal");
    let dir = PrebuiltAssetDir::new(l.tones.clone());
    assert_eq!(dir.resolve("../secret.env"), None);
    assert_eq!(dir.resolve("previews/../../secret.env"), None);
    let absolute = l.base.join("secret.env");
    assert_eq!(dir.resolve(absolute.to_str().unwrap()), None);
}

#[test]
fn at_assets_03_missing_directories_and_names_are_none() {
    let l = layout("missing");
    let dir = PrebuiltAssetDir::new(l.tones.clone());
    assert_eq!(dir.resolve("Nope.wav"), None);
    assert_eq!(dir.resolve(""), None);
    assert_eq!(dir.resolve("previews"), None);
    assert_eq!(dir.resolve("."), None);

    let gone = PrebuiltAssetDir::new(l.base.join("no-such-dir"));
    assert!(!gone.is_readable());
    assert_eq!(gone.resolve("Root_256_preview.wav"), None);
}

#[cfg(unix)]
#[test]
fn at_assets_04_symlink_escape_is_rejected() {
    let l = layout("symlink");
    std::os::unix::fs::symlink(l.base.join("secret.env"), l.tones.join("escape.wav")).unwrap();
    let dir = PrebuiltAssetDir::new(l.tones.clone());
    assert_eq!(dir.resolve("escape.wav"), None);
}
