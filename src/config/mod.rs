mod types;

pub use types::HookConfig;
