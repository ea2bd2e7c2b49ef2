#![forbid(unsafe_code)]

use secrecy::SecretString;
use tonewell_engines::secret_vault::SecretVault;
use tonewell_kernel_contracts::secret_ids::SecretId;

pub const VAULT_USAGE: &str =
    "usage: tonewell vault <status | set <key_id> | clear <key_id> | rotate-signing-key>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultCommand {
    Status,
    Set(SecretId),
    Clear(SecretId),
    RotateSigningKey,
}

impl VaultCommand {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let key = || -> Result<SecretId, String> {
            let raw = args.get(1).ok_or_else(|| {
                format!("missing key id. allowed: {}", allowed_ids())
            })?;
            SecretId::parse(raw)
                .ok_or_else(|| format!("unknown key id '{raw}'. allowed: {}", allowed_ids()))
        };
        match args.first().map(String::as_str) {
            Some("status") => Ok(Self::Status),
            Some("set") => Ok(Self::Set(key()?)),
            Some("clear") => Ok(Self::Clear(key()?)),
            Some("rotate-signing-key") => Ok(Self::RotateSigningKey),
            Some(other) => Err(format!("unknown vault command '{other}'\n{VAULT_USAGE}")),
            None => Err(VAULT_USAGE.to_string()),
        }
    }
}

/// Runs one vault command. `value` is only read by `set`. The returned text
/// never contains a secret value.
pub fn run_vault_command(
    vault: &SecretVault,
    command: VaultCommand,
    value: Option<SecretString>,
) -> Result<String, String> {
    match command {
        VaultCommand::Status => {
            let status = vault.status().map_err(|e| e.to_string())?;
            let mut lines: Vec<String> = SecretId::all()
                .iter()
                .map(|id| {
                    let state = if status.is_set(*id) { "set" } else { "empty" };
                    format!("{}: {state}", id.as_str())
                })
                .collect();
            if let Some(at) = status.signing_key_rotated_at {
                lines.push(format!("signing key rotated at unix {at}"));
            }
            Ok(lines.join("\n"))
        }
        VaultCommand::Set(id) => {
            let value = value.ok_or_else(|| format!("no value given for {}", id.as_str()))?;
            vault.store(id, &value).map_err(|e| e.to_string())?;
            Ok(format!("{} stored", id.as_str()))
        }
        VaultCommand::Clear(id) => {
            let had_value = vault.clear(id).map_err(|e| e.to_string())?;
            Ok(if had_value {
                format!("{} cleared", id.as_str())
            } else {
                format!("{} was already empty", id.as_str())
            })
        }
        VaultCommand::RotateSigningKey => {
            vault.rotate_signing_key().map_err(|e| e.to_string())?;
            Ok("token_signing_key rotated; restart the storefront to apply".to_string())
        }
    }
}

fn allowed_ids() -> String {
    SecretId::allowed_key_names().join(", ")
}
