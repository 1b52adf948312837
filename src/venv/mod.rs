pub mod activate;
pub mod pyvenv;

pub use activate::{resolve_tool_environment, EnvironmentOverrides, VenvLayout, DEFAULT_VENV_DIR};
pub use pyvenv::PyVenvCfg;
