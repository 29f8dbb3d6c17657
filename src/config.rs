use crate::session::SessionConfig;
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    /// Defaults for sessions started over HTTP
    #[serde(default)]
    pub recording: SessionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl HttpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Failed to parse config")?;
        cfg.recording
            .validate()
            .context("Invalid [recording] defaults")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OverflowPolicy;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_with_recording_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture-session.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[service]
name = "capture-session"

[service.http]
bind = "127.0.0.1"
port = 3900

[recording]
output_path = "/tmp/out.mp4"
fps = 24

[recording.handoff]
video_overflow = "reject_new"
"#
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.service.http.address(), "127.0.0.1:3900");
        assert_eq!(cfg.recording.fps, 24);
        assert_eq!(cfg.recording.width, 1920);
        assert_eq!(cfg.recording.handoff.video_overflow, OverflowPolicy::RejectNew);
        assert_eq!(cfg.recording.handoff.video_capacity, 8);
    }

    #[test]
    fn test_recording_section_optional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("minimal.toml");
        std::fs::write(
            &path,
            "[service]\nname = \"cs\"\n[service.http]\nbind = \"0.0.0.0\"\nport = 80\n",
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.recording.fps, 30);
    }

    #[test]
    fn test_invalid_recording_defaults_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "[service]\nname = \"cs\"\n[service.http]\nbind = \"0.0.0.0\"\nport = 80\n[recording]\nfps = 0\n",
        )
        .unwrap();

        assert!(Config::load(path.to_str().unwrap()).is_err());
    }
}
