use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use luaupdate::install_dir::Environment;
use luaupdate::ownership::InvokingUser;
use luaupdate::*;

const MACOS_URL: &str = "https://example.com/releases/v0.600/luau-macos.zip";
const ZIPBALL_URL: &str = "https://api.example.com/repos/Roblox/luau/zipball/v0.600";

/// Release host that serves canned responses and records every request.
struct MockHost {
    metadata: ReleaseMetadata,
    files: HashMap<String, Vec<u8>>,
    metadata_calls: Cell<usize>,
    downloads: RefCell<Vec<String>>,
}

impl MockHost {
    fn new(metadata: ReleaseMetadata) -> Self {
        Self {
            metadata,
            files: HashMap::new(),
            metadata_calls: Cell::new(0),
            downloads: RefCell::new(Vec::new()),
        }
    }

    fn serve(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    fn downloads(&self) -> Vec<String> {
        self.downloads.borrow().clone()
    }
}

impl ReleaseHost for MockHost {
    fn latest_release(&self) -> UpdateResult<ReleaseMetadata> {
        self.metadata_calls.set(self.metadata_calls.get() + 1);
        Ok(self.metadata.clone())
    }

    fn download(&self, url: &str) -> UpdateResult<Vec<u8>> {
        self.downloads.borrow_mut().push(url.to_string());
        self.files.get(url).cloned().ok_or_else(|| UpdateError::Network {
            url: url.to_string(),
            message: "server answered 404 Not Found".to_string(),
            source: None,
        })
    }
}

struct FakeBuilder {
    available: bool,
}

impl SourceBuilder for FakeBuilder {
    fn is_available(&self) -> bool {
        self.available
    }

    fn build(&self, source_dir: &Path, target: &Path) -> UpdateResult<Vec<PathBuf>> {
        assert!(source_dir.join("CMakeLists.txt").is_file());
        std::fs::create_dir_all(target).unwrap();
        let exe = target.join("luau");
        std::fs::write(&exe, b"built from source").unwrap();
        Ok(vec![exe])
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn release() -> ReleaseMetadata {
    ReleaseMetadata {
        version_tag: "v0.600".to_string(),
        assets: vec![
            Asset {
                name: "luau-macos.zip".to_string(),
                download_url: MACOS_URL.to_string(),
            },
            Asset {
                name: "luau-windows.zip".to_string(),
                download_url: "https://example.com/releases/v0.600/luau-windows.zip".to_string(),
            },
        ],
        source_archive_url: ZIPBALL_URL.to_string(),
    }
}

fn macos_host() -> MockHost {
    MockHost::new(release()).serve(
        MACOS_URL,
        zip_bytes(&[("luau", b"repl"), ("luau-analyze", b"analyze")]),
    )
}

fn config(dir: &TempDir, platform: Platform) -> Config {
    Config {
        cache_dir: dir.path().join(".cache"),
        install_dir: Some(dir.path().join("bin")),
        platform: Some(platform),
        ..Config::default()
    }
}

fn run(config: &Config, host: &MockHost, builder_available: bool) -> UpdateResult<Outcome> {
    let owner = InvokingUser::unprivileged("tester", None);
    let installer = Installer::new(owner.clone(), Box::new(FakeBuilder { available: builder_available }));
    Updater::with_parts(config, host, config.platform(), owner, Environment::default(), installer)?.run()
}

fn settings(dir: &TempDir) -> serde_json::Value {
    let content = std::fs::read_to_string(dir.path().join(".cache").join(".settings.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn fresh_macos_install() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);
    let host = macos_host();

    let outcome = run(&config, &host, false).unwrap();

    assert_eq!(host.metadata_calls.get(), 1);
    assert_eq!(host.downloads(), vec![MACOS_URL.to_string()]);
    assert!(dir.path().join(".cache/v0.600/luau-macos.zip").is_file());
    assert_eq!(std::fs::read(dir.path().join("bin/luau")).unwrap(), b"repl");
    assert_eq!(std::fs::read(dir.path().join("bin/luau-analyze")).unwrap(), b"analyze");
    assert_eq!(settings(&dir), serde_json::json!({"version": "v0.600"}));
    match outcome {
        Outcome::Installed { version, directory, files, from_cache, from_source } => {
            assert_eq!(version, "v0.600");
            assert_eq!(directory, dir.path().join("bin"));
            assert_eq!(files.len(), 2);
            assert!(!from_cache);
            assert!(!from_source);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn already_current_does_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);
    std::fs::create_dir_all(dir.path().join(".cache")).unwrap();
    std::fs::write(dir.path().join(".cache/.settings.json"), r#"{"version": "v0.600"}"#).unwrap();
    let host = macos_host();

    let outcome = run(&config, &host, false).unwrap();

    assert_eq!(outcome, Outcome::UpToDate { version: "v0.600".to_string() });
    assert_eq!(host.metadata_calls.get(), 1);
    assert!(host.downloads().is_empty());
    assert!(!dir.path().join("bin").exists());
    assert!(!dir.path().join(".cache/v0.600").exists());
}

#[test]
fn second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);

    let first = macos_host();
    run(&config, &first, false).unwrap();
    let settings_after_first = settings(&dir);

    let second = macos_host();
    let outcome = run(&config, &second, false).unwrap();

    assert!(matches!(outcome, Outcome::UpToDate { .. }));
    assert_eq!(first.metadata_calls.get(), 1);
    assert_eq!(second.metadata_calls.get(), 1);
    assert!(second.downloads().is_empty());
    assert_eq!(settings(&dir), settings_after_first);
}

#[test]
fn forced_reinstall_uses_cached_artifact() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, Platform::MacOs);
    run(&config, &macos_host(), false).unwrap();
    std::fs::remove_file(dir.path().join("bin/luau")).unwrap();

    config.force = true;
    let host = macos_host();
    let outcome = run(&config, &host, false).unwrap();

    assert!(host.downloads().is_empty());
    assert!(matches!(outcome, Outcome::Installed { from_cache: true, .. }));
    assert_eq!(std::fs::read(dir.path().join("bin/luau")).unwrap(), b"repl");
}

#[test]
fn cached_artifact_from_interrupted_run_is_reused() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);
    let version_dir = dir.path().join(".cache/v0.600");
    std::fs::create_dir_all(&version_dir).unwrap();
    std::fs::write(version_dir.join("luau-macos.zip"), zip_bytes(&[("luau", b"cached")])).unwrap();

    let host = MockHost::new(release());
    run(&config, &host, false).unwrap();

    assert!(host.downloads().is_empty());
    assert_eq!(std::fs::read(dir.path().join("bin/luau")).unwrap(), b"cached");
    assert_eq!(settings(&dir), serde_json::json!({"version": "v0.600"}));
}

#[test]
fn unmatched_platform_builds_from_source() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::Linux { distro: Some("fedora".to_string()) });
    let host = MockHost::new(release()).serve(
        ZIPBALL_URL,
        zip_bytes(&[("Roblox-luau-0123abc/CMakeLists.txt", b"project(Luau)")]),
    );

    let outcome = run(&config, &host, true).unwrap();

    assert_eq!(host.downloads(), vec![ZIPBALL_URL.to_string()]);
    assert!(dir.path().join(".cache/v0.600/luau-source.zip").is_file());
    assert!(!dir.path().join(".cache/v0.600/source").exists());
    assert!(matches!(outcome, Outcome::Installed { from_source: true, .. }));
    assert_eq!(std::fs::read(dir.path().join("bin/luau")).unwrap(), b"built from source");
    assert_eq!(settings(&dir), serde_json::json!({"version": "v0.600"}));
}

#[test]
fn source_fallback_without_build_tool_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::Linux { distro: None });
    let host = MockHost::new(release());

    let err = run(&config, &host, false).unwrap_err();

    assert!(matches!(err, UpdateError::UnsupportedPlatform(_)));
    assert!(host.downloads().is_empty());
    assert_eq!(settings(&dir), serde_json::json!({}));
}

#[test]
fn failed_download_keeps_previous_version() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);
    std::fs::create_dir_all(dir.path().join(".cache")).unwrap();
    std::fs::write(dir.path().join(".cache/.settings.json"), r#"{"version": "v0.599"}"#).unwrap();
    let host = MockHost::new(release());

    let err = run(&config, &host, false).unwrap_err();

    assert!(matches!(err, UpdateError::Network { .. }));
    assert_eq!(settings(&dir), serde_json::json!({"version": "v0.599"}));
    assert!(!dir.path().join(".cache/v0.600/luau-macos.zip").exists());
}

#[test]
fn broken_archive_is_not_recorded_as_installed() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);
    let host = MockHost::new(release()).serve(MACOS_URL, b"<html>not a zip</html>".to_vec());

    let err = run(&config, &host, false).unwrap_err();

    assert!(matches!(err, UpdateError::Extraction { .. }));
    assert_eq!(settings(&dir), serde_json::json!({}));
}

#[test]
fn concurrent_run_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);
    let owner = InvokingUser::unprivileged("tester", None);
    let cache = CacheStore::open(&config.cache_dir, owner).unwrap();
    let _held = cache.lock().unwrap();

    let host = macos_host();
    let err = run(&config, &host, false).unwrap_err();

    assert!(matches!(err, UpdateError::CacheIo { .. }));
    assert_eq!(host.metadata_calls.get(), 0);
}

#[test]
fn lock_file_from_killed_run_does_not_block_rerun() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, Platform::MacOs);
    std::fs::create_dir_all(dir.path().join(".cache")).unwrap();
    std::fs::write(dir.path().join(".cache/.lock"), "31337\n").unwrap();

    let host = macos_host();
    let outcome = run(&config, &host, false).unwrap();

    assert!(matches!(outcome, Outcome::Installed { .. }));
    assert_eq!(settings(&dir), serde_json::json!({"version": "v0.600"}));
}

#[test]
fn unresolvable_install_dir_falls_back_to_artifact_dir() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, Platform::Unsupported("haiku".to_string()));
    config.install_dir = None;
    let host = MockHost::new(release()).serve(
        ZIPBALL_URL,
        zip_bytes(&[("Roblox-luau-0123abc/CMakeLists.txt", b"project(Luau)")]),
    );

    let outcome = run(&config, &host, true).unwrap();

    let version_dir = dir.path().join(".cache").join("v0.600");
    match outcome {
        Outcome::Installed { directory, .. } => assert_eq!(directory, version_dir),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(version_dir.join("luau").is_file());
}
