//! Natively compiled snapshot parser, loaded at runtime.
//!
//! The library is resolved by probing a fixed order of locations and loaded
//! lazily on the first parse. The load is memoized: concurrent first calls
//! await the same in-flight load, and the outcome — success or failure — is
//! cached so a duplicate attempt never runs. A load failure is reported as
//! `AdapterUnavailable`, never papered over with a different adapter.
//!
//! ABI: the library exports
//! `vmix_snapshot_parse(*const c_char) -> *mut c_char` returning a
//! canonical-shaped JSON document (attributes under `"$"`, text under
//! `"_"`, children as arrays), and `vmix_snapshot_free(*mut c_char)` to
//! release it. NULL means the library rejected the snapshot.

use super::SnapshotParser;
use crate::config::NativeConfig;
use crate::error::{AdapterError, AdapterUnavailableError, ParseError};
use crate::tree::{Element, Node, Scalar};
use async_trait::async_trait;
use libloading::{Library, Symbol};
use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SYMBOL_PARSE: &[u8] = b"vmix_snapshot_parse";
const SYMBOL_FREE: &[u8] = b"vmix_snapshot_free";

type ParseFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;
type FreeFn = unsafe extern "C" fn(*mut c_char);

/// Library file name on this platform (e.g. `libvmix_snapshot.so`).
fn library_file_name() -> String {
    format!(
        "{}vmix_snapshot{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

/// Probe order: installed location next to the executable, then the
/// development checkout, then a user-configured sibling directory. First
/// existing file wins.
fn search_dirs(user_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            dirs.push(dir.to_path_buf());
        }
    }
    dirs.push(PathBuf::from("native"));
    if let Some(dir) = user_dir {
        dirs.push(dir.to_path_buf());
    }
    dirs
}

/// Resolve the library path, reporting every probed location on failure.
pub(crate) fn resolve_library(dirs: &[PathBuf]) -> Result<PathBuf, AdapterUnavailableError> {
    let file = library_file_name();
    let mut probed = Vec::new();
    for dir in dirs {
        let candidate = dir.join(&file);
        if candidate.is_file() {
            debug!("native parser resolved at {}", candidate.display());
            return Ok(candidate);
        }
        probed.push(candidate);
    }
    Err(AdapterUnavailableError {
        message: format!(
            "{} not found (probed {})",
            file,
            probed
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        probed,
    })
}

struct NativeLib {
    lib: Library,
}

impl NativeLib {
    fn load(path: &Path) -> Result<Self, AdapterUnavailableError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| AdapterUnavailableError {
            message: format!("failed to load {}: {e}", path.display()),
            probed: vec![path.to_path_buf()],
        })?;
        // Verify the ABI up front so a bad library fails at load, not mid-cycle
        unsafe {
            lib.get::<ParseFn>(SYMBOL_PARSE)
                .and(lib.get::<FreeFn>(SYMBOL_FREE))
                .map_err(|e| AdapterUnavailableError {
                    message: format!("{} lacks the parse ABI: {e}", path.display()),
                    probed: vec![path.to_path_buf()],
                })?;
        }
        Ok(Self { lib })
    }

    fn parse(&self, raw: &str) -> Result<String, AdapterError> {
        let input = CString::new(raw)
            .map_err(|_| ParseError::new("snapshot contains an interior NUL byte"))?;
        unsafe {
            let parse: Symbol<'_, ParseFn> = self
                .lib
                .get(SYMBOL_PARSE)
                .map_err(|e| AdapterUnavailableError::new(format!("parse symbol vanished: {e}")))?;
            let free: Symbol<'_, FreeFn> = self
                .lib
                .get(SYMBOL_FREE)
                .map_err(|e| AdapterUnavailableError::new(format!("free symbol vanished: {e}")))?;

            let out = parse(input.as_ptr());
            if out.is_null() {
                return Err(ParseError::new("native parser rejected the snapshot").into());
            }
            let json = CStr::from_ptr(out).to_string_lossy().into_owned();
            free(out);
            Ok(json)
        }
    }
}

pub struct NativeAdapter {
    search_dirs: Vec<PathBuf>,
    cell: OnceCell<Result<NativeLib, AdapterUnavailableError>>,
}

impl NativeAdapter {
    pub fn from_config(native: Option<&NativeConfig>) -> Self {
        let user_dir = native.and_then(|n| n.lib_dir.as_deref());
        Self::with_search_dirs(search_dirs(user_dir))
    }

    /// Explicit probe directories, bypassing the standard order.
    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            cell: OnceCell::new(),
        }
    }

    /// One-shot load. `OnceCell` makes concurrent first callers await the
    /// same in-flight future; storing the `Result` makes the failure sticky.
    async fn lib(&self) -> Result<&NativeLib, AdapterError> {
        let outcome = self
            .cell
            .get_or_init(|| async {
                let path = resolve_library(&self.search_dirs)?;
                info!("loading native snapshot parser from {}", path.display());
                NativeLib::load(&path)
            })
            .await;
        match outcome {
            Ok(lib) => Ok(lib),
            Err(e) => Err(AdapterError::Unavailable(e.clone())),
        }
    }
}

#[async_trait]
impl SnapshotParser for NativeAdapter {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn parse(&self, raw: &str) -> Result<Node, AdapterError> {
        let lib = self.lib().await?;
        let json = lib.parse(raw)?;
        let value: serde_json::Value = serde_json::from_str(&json)
            .map_err(|e| ParseError::new(format!("native parser returned invalid json: {e}")))?;
        Ok(json_to_node(value))
    }
}

fn json_scalar(value: serde_json::Value) -> Scalar {
    match value {
        serde_json::Value::Bool(b) => Scalar::Bool(b),
        serde_json::Value::Number(n) => Scalar::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Scalar::Text(s),
        other => Scalar::Text(other.to_string()),
    }
}

fn json_to_node(value: serde_json::Value) -> Node {
    match value {
        serde_json::Value::Null => Node::Null,
        serde_json::Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
        serde_json::Value::Number(n) => Node::Scalar(Scalar::Number(n.as_f64().unwrap_or_default())),
        serde_json::Value::String(s) => Node::Scalar(Scalar::Text(s)),
        serde_json::Value::Array(items) => {
            Node::Seq(items.into_iter().map(json_to_node).collect())
        }
        serde_json::Value::Object(map) => {
            let mut elem = Element::default();
            for (key, value) in map {
                match key.as_str() {
                    "$" => {
                        if let serde_json::Value::Object(attrs) = value {
                            for (name, attr) in attrs {
                                elem.attrs.insert(name, json_scalar(attr));
                            }
                        }
                    }
                    "_" => elem.text = Some(json_scalar(value)),
                    _ => {
                        elem.children.insert(key, json_to_node(value));
                    }
                }
            }
            Node::Elem(elem)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_earlier_locations() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let file = library_file_name();
        std::fs::write(second.path().join(&file), b"").unwrap();

        // Only the later dir has the file
        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            resolve_library(&dirs).unwrap(),
            second.path().join(&file)
        );

        // Once the earlier dir has it too, it wins
        std::fs::write(first.path().join(&file), b"").unwrap();
        assert_eq!(resolve_library(&dirs).unwrap(), first.path().join(&file));
    }

    #[test]
    fn test_resolve_failure_reports_every_probe() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let dirs = vec![a.path().to_path_buf(), b.path().to_path_buf()];

        let err = resolve_library(&dirs).unwrap_err();
        assert_eq!(err.probed.len(), 2);
        assert!(err.message.contains(&library_file_name()));
    }

    #[tokio::test]
    async fn test_load_failure_is_sticky_and_distinct() {
        let empty = tempfile::tempdir().unwrap();
        let adapter = NativeAdapter::with_search_dirs(vec![empty.path().to_path_buf()]);

        let first = adapter.parse("<vmix/>").await.unwrap_err();
        let second = adapter.parse("<vmix/>").await.unwrap_err();
        for err in [first, second] {
            match err {
                AdapterError::Unavailable(e) => assert_eq!(e.probed.len(), 1),
                other => panic!("expected Unavailable, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_load() {
        let empty = tempfile::tempdir().unwrap();
        let adapter = std::sync::Arc::new(NativeAdapter::with_search_dirs(vec![empty
            .path()
            .to_path_buf()]));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let adapter = std::sync::Arc::clone(&adapter);
                tokio::spawn(async move { adapter.parse("<vmix/>").await })
            })
            .collect();
        for task in tasks {
            assert!(matches!(
                task.await.unwrap(),
                Err(AdapterError::Unavailable(_))
            ));
        }
    }

    #[test]
    fn test_json_payload_maps_to_tree() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{"vmix":[{"$":{"recording":true},"active":["1"],"inputs":[{"input":[{"$":{"key":"a1","number":1}}]}]}]}"#,
        )
        .unwrap();

        let node = json_to_node(value);
        let doc = node.as_elem().unwrap();
        let vmix = doc.first_elem("vmix").unwrap();
        assert_eq!(vmix.attr("recording"), Some(&Scalar::Bool(true)));
        assert_eq!(
            vmix.child_scalar("active"),
            Some(&Scalar::Text("1".to_string()))
        );
        let inputs = vmix.first_elem("inputs").unwrap();
        let input = inputs.first_elem("input").unwrap();
        assert_eq!(input.attr_str("key"), Some("a1".to_string()));
        assert_eq!(input.attr_u32("number"), Some(1));
    }
}
