use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use relay_core::normalize::{detect_provider, normalize_completion};
use serde_json::Value;

use super::{CommandResult, EXIT_INVALID_INPUT};

pub fn run(provider: &str, file: &Path) -> CommandResult {
    let raw = match read_json(file) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure("normalize", "invalid_input", format!("{error:#}"), EXIT_INVALID_INPUT)
        }
    };

    let mut completion = normalize_completion(detect_provider(provider, None), raw);
    // raw payload is omitted from output
    completion.raw = Value::Null;
    CommandResult::report("normalize", "completion", &completion)
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read response file `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("response file `{}` is not JSON", path.display()))
}
