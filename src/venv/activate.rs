use crate::core::error::{LauncherError, Result};
use crate::core::{resolve_path, EnvMap};
use crate::venv::pyvenv::PyVenvCfg;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub const DEFAULT_VENV_DIR: &str = ".venv";

/// Variables `activate` removes from the environment.
const UNSET_VARS: &[&str] = &["PYTHONHOME"];

/// Conventional on-disk layout of a virtual environment.
#[derive(Debug, Clone)]
pub struct VenvLayout {
    venv_path: PathBuf,
}

impl VenvLayout {
    pub fn new(project_dir: &Path, venv: &Path) -> Self {
        Self::at(resolve_path(project_dir, venv))
    }

    pub fn at(venv_path: PathBuf) -> Self {
        Self { venv_path }
    }

    pub fn venv_path(&self) -> &Path {
        &self.venv_path
    }

    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_path.join("Scripts")
        } else {
            self.venv_path.join("bin")
        }
    }

    pub fn activation_script(&self) -> PathBuf {
        self.bin_dir().join("activate")
    }

    pub fn pyvenv_cfg(&self) -> PathBuf {
        self.venv_path.join("pyvenv.cfg")
    }
}

/// What activating a virtual environment changes, as data.
///
/// `bin_dir` is prepended to the inherited `PATH`; `set` and `unset` are
/// applied verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentOverrides {
    pub venv_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub set: BTreeMap<String, String>,
    pub unset: Vec<String>,
    pub python_version: Option<String>,
}

impl EnvironmentOverrides {
    /// Merge the overrides into a copy of `parent`.
    ///
    /// Mirrors `activate`: the venv's bin dir goes first on `PATH` (after
    /// dropping the bin dir of any venv already active in `parent`), then
    /// `set` is inserted and `unset` removed. Empty `PATH` entries survive.
    pub fn apply<I>(&self, parent: I) -> Result<EnvMap>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut env: EnvMap = parent.into_iter().collect();

        let stale_bin = env
            .get(OsStr::new("VIRTUAL_ENV"))
            .map(|old| VenvLayout::at(PathBuf::from(old)).bin_dir());

        let mut entries = vec![self.bin_dir.clone()];
        if let Some(inherited) = env.get(OsStr::new("PATH")) {
            entries.extend(
                std::env::split_paths(inherited).filter(|entry| Some(entry) != stale_bin.as_ref()),
            );
        }

        let path = std::env::join_paths(entries)
            .map_err(|e| LauncherError::ActivationFailed(format!("cannot build PATH: {}", e)))?;

        env.insert("PATH".into(), path);
        for (name, value) in &self.set {
            env.insert(name.into(), value.into());
        }
        for name in &self.unset {
            env.remove(OsStr::new(name));
        }

        Ok(env)
    }

    /// `PATH` from an environment built by [`apply`](Self::apply).
    pub fn search_path(env: &EnvMap) -> OsString {
        env.get(OsStr::new("PATH")).cloned().unwrap_or_default()
    }
}

/// Resolve the overrides for the virtual environment described by `layout`.
///
/// The activation script must exist; it is the contract that a venv has been
/// installed there. Its contents are not interpreted.
pub async fn resolve_tool_environment(layout: &VenvLayout) -> Result<EnvironmentOverrides> {
    let script = layout.activation_script();

    let metadata = match fs::metadata(&script).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LauncherError::ActivationNotFound(script));
        }
        Err(e) => {
            return Err(LauncherError::ActivationFailed(format!(
                "cannot read {}: {}",
                script.display(),
                e
            )));
        }
    };

    if !metadata.is_file() {
        return Err(LauncherError::ActivationFailed(format!(
            "{} is not a file",
            script.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(LauncherError::ActivationFailed(format!(
            "{} is empty",
            script.display()
        )));
    }

    let cfg_path = layout.pyvenv_cfg();
    let cfg = PyVenvCfg::load(&cfg_path).await?;
    match &cfg {
        Some(cfg) => debug!(home = ?cfg.home(), version = ?cfg.version(), "pyvenv.cfg loaded"),
        None => warn!(path = %cfg_path.display(), "pyvenv.cfg not found; using defaults"),
    }

    let venv_dir = layout.venv_path().to_path_buf();
    let venv_value = venv_dir.to_str().ok_or_else(|| {
        LauncherError::ActivationFailed(format!(
            "{} is not valid UTF-8",
            venv_dir.display()
        ))
    })?;
    let prompt = cfg
        .as_ref()
        .and_then(|cfg| cfg.prompt())
        .map(str::to_string)
        .or_else(|| {
            venv_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    let set = BTreeMap::from([
        ("VIRTUAL_ENV".to_string(), venv_value.to_string()),
        ("VIRTUAL_ENV_PROMPT".to_string(), prompt),
    ]);

    let overrides = EnvironmentOverrides {
        bin_dir: layout.bin_dir(),
        set,
        unset: UNSET_VARS.iter().map(|name| name.to_string()).collect(),
        python_version: cfg.as_ref().and_then(|cfg| cfg.version()).map(str::to_string),
        venv_dir,
    };

    debug!(?overrides, "virtual environment resolved");
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_venv(root: &Path, cfg: Option<&str>) -> VenvLayout {
        let layout = VenvLayout::new(root, Path::new(DEFAULT_VENV_DIR));
        fs::create_dir_all(layout.bin_dir()).await.unwrap();
        fs::write(layout.activation_script(), "# activate\n")
            .await
            .unwrap();
        if let Some(cfg) = cfg {
            fs::write(layout.pyvenv_cfg(), cfg).await.unwrap();
        }
        layout
    }

    fn overrides(root: &Path) -> EnvironmentOverrides {
        let layout = VenvLayout::new(root, Path::new(DEFAULT_VENV_DIR));
        EnvironmentOverrides {
            venv_dir: layout.venv_path().to_path_buf(),
            bin_dir: layout.bin_dir(),
            set: BTreeMap::from([
                (
                    "VIRTUAL_ENV".to_string(),
                    layout.venv_path().display().to_string(),
                ),
                ("VIRTUAL_ENV_PROMPT".to_string(), "app".to_string()),
            ]),
            unset: vec!["PYTHONHOME".to_string()],
            python_version: None,
        }
    }

    #[test]
    fn layout_paths() {
        let layout = VenvLayout::new(Path::new("/srv/app"), Path::new(".venv"));
        assert_eq!(layout.venv_path(), Path::new("/srv/app/.venv"));

        #[cfg(unix)]
        assert!(layout.activation_script().ends_with(".venv/bin/activate"));

        #[cfg(windows)]
        assert!(layout.activation_script().ends_with(".venv\\Scripts\\activate"));
    }

    #[tokio::test]
    async fn missing_activation_script_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let layout = VenvLayout::new(dir.path(), Path::new(DEFAULT_VENV_DIR));

        let err = resolve_tool_environment(&layout).await.unwrap_err();
        match err {
            LauncherError::ActivationNotFound(path) => {
                assert_eq!(path, layout.activation_script())
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_activation_script_fails_activation() {
        let dir = tempfile::tempdir().unwrap();
        let layout = make_venv(dir.path(), None).await;
        fs::write(layout.activation_script(), "").await.unwrap();

        let err = resolve_tool_environment(&layout).await.unwrap_err();
        assert!(matches!(err, LauncherError::ActivationFailed(_)));
    }

    #[tokio::test]
    async fn directory_in_place_of_script_fails_activation() {
        let dir = tempfile::tempdir().unwrap();
        let layout = VenvLayout::new(dir.path(), Path::new(DEFAULT_VENV_DIR));
        fs::create_dir_all(layout.activation_script()).await.unwrap();

        let err = resolve_tool_environment(&layout).await.unwrap_err();
        assert!(matches!(err, LauncherError::ActivationFailed(_)));
    }

    #[tokio::test]
    async fn prompt_comes_from_pyvenv_cfg() {
        let dir = tempfile::tempdir().unwrap();
        let layout = make_venv(dir.path(), Some("version = 3.11.9\nprompt = 'doc-api'\n")).await;

        let overrides = resolve_tool_environment(&layout).await.unwrap();
        assert_eq!(overrides.set["VIRTUAL_ENV_PROMPT"], "doc-api");
        assert_eq!(
            overrides.set["VIRTUAL_ENV"],
            layout.venv_path().to_str().unwrap()
        );
        assert_eq!(overrides.unset, vec!["PYTHONHOME".to_string()]);
        assert_eq!(overrides.python_version.as_deref(), Some("3.11.9"));
        assert_eq!(overrides.venv_dir, layout.venv_path());
    }

    #[tokio::test]
    async fn prompt_defaults_to_venv_dir_name() {
        let dir = tempfile::tempdir().unwrap();
        let layout = make_venv(dir.path(), None).await;

        let overrides = resolve_tool_environment(&layout).await.unwrap();
        assert_eq!(overrides.set["VIRTUAL_ENV_PROMPT"], ".venv");
        assert_eq!(overrides.python_version, None);
    }

    #[tokio::test]
    async fn malformed_pyvenv_cfg_fails_activation() {
        let dir = tempfile::tempdir().unwrap();
        let layout = make_venv(dir.path(), Some("this is not a cfg\n")).await;

        let err = resolve_tool_environment(&layout).await.unwrap_err();
        assert!(matches!(err, LauncherError::ActivationFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn apply_prepends_bin_and_sets_markers() {
        let o = overrides(Path::new("/srv/app"));
        let parent = vec![
            (OsString::from("PATH"), OsString::from("/usr/bin:/bin")),
            (OsString::from("PYTHONHOME"), OsString::from("/opt/py")),
            (OsString::from("HOME"), OsString::from("/home/dev")),
        ];

        let env = o.apply(parent).unwrap();
        assert_eq!(
            env.get(OsStr::new("PATH")).unwrap(),
            "/srv/app/.venv/bin:/usr/bin:/bin"
        );
        assert_eq!(env.get(OsStr::new("VIRTUAL_ENV")).unwrap(), "/srv/app/.venv");
        assert_eq!(env.get(OsStr::new("VIRTUAL_ENV_PROMPT")).unwrap(), "app");
        assert_eq!(env.get(OsStr::new("HOME")).unwrap(), "/home/dev");
        assert!(!env.contains_key(OsStr::new("PYTHONHOME")));
    }

    #[cfg(unix)]
    #[test]
    fn apply_drops_previously_active_venv() {
        let o = overrides(Path::new("/srv/app"));
        let parent = vec![
            (
                OsString::from("PATH"),
                OsString::from("/old/.venv/bin:/usr/bin"),
            ),
            (OsString::from("VIRTUAL_ENV"), OsString::from("/old/.venv")),
        ];

        let env = o.apply(parent).unwrap();
        assert_eq!(
            EnvironmentOverrides::search_path(&env),
            "/srv/app/.venv/bin:/usr/bin"
        );
        assert_eq!(env.get(OsStr::new("VIRTUAL_ENV")).unwrap(), "/srv/app/.venv");
    }

    #[cfg(unix)]
    #[test]
    fn apply_keeps_empty_path_entries() {
        let o = overrides(Path::new("/srv/app"));
        let parent = vec![(OsString::from("PATH"), OsString::from("/usr/bin::/bin"))];

        let env = o.apply(parent).unwrap();
        assert_eq!(
            EnvironmentOverrides::search_path(&env),
            "/srv/app/.venv/bin:/usr/bin::/bin"
        );
    }

    #[cfg(unix)]
    #[test]
    fn apply_without_parent_path() {
        let o = overrides(Path::new("/srv/app"));
        let env = o.apply(Vec::new()).unwrap();
        assert_eq!(EnvironmentOverrides::search_path(&env), "/srv/app/.venv/bin");
    }
}
