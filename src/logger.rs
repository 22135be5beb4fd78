use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::protocol::Kind;

pub trait SyncLogger: Send + Sync {
    fn connected(&self, _peer: &str) {}
    fn request(&self, _peer: &str, _kind: Kind) {}
    fn stored(&self, _name: &str, _bytes: u64) {}
    fn deleted(&self, _name: &str) {}
    fn error(&self, _context: &str, _msg: &str) {}
    fn disconnected(&self, _peer: &str) {}
}

pub struct NoopLogger;
impl SyncLogger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl SyncLogger for TextLogger {
    fn connected(&self, peer: &str) {
        self.line(&format!("CONNECT peer={}", peer));
    }
    fn request(&self, peer: &str, kind: Kind) {
        self.line(&format!("REQUEST peer={} kind={}", peer, kind));
    }
    fn stored(&self, name: &str, bytes: u64) {
        self.line(&format!("STORE name={} bytes={}", name, bytes));
    }
    fn deleted(&self, name: &str) {
        self.line(&format!("DELETE name={}", name));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
    fn disconnected(&self, peer: &str) {
        self.line(&format!("DISCONNECT peer={}", peer));
    }
}
