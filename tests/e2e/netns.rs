//! Network namespace test helpers

use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique namespace names
static NAMESPACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A named network namespace, deleted on drop
pub struct Namespace {
    name: String,
}

impl Namespace {
    /// Create a namespace with a unique name (PID + counter based)
    pub fn add(prefix: &str) -> Result<Self, String> {
        let count = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}-{}-{}", prefix, std::process::id(), count);

        let output = Command::new("ip")
            .args(["netns", "add", &name])
            .output()
            .map_err(|e| format!("Failed to run ip: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "ip netns add failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a command inside the namespace
    pub fn exec(&self, args: &[&str]) -> Result<Output, String> {
        Command::new("ip")
            .args(["netns", "exec", &self.name])
            .args(args)
            .output()
            .map_err(|e| format!("Failed to run {:?}: {}", args, e))
    }

    /// Run a command inside the namespace and require success
    pub fn exec_ok(&self, args: &[&str]) -> Result<(), String> {
        let output = self.exec(args)?;
        if !output.status.success() {
            return Err(format!(
                "{:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .output();
    }
}
