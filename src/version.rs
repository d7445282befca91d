// Engine identity reported by `GET /version` and the startup log line

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `checkengine/0.1.0` style banner for the startup log.
pub fn banner() -> String {
    format!("{}/{}", NAME, VERSION)
}
