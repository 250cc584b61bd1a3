//! Configuration file commands. None of these touch the host network.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// WPA2-PSK passphrase bounds
const PASSPHRASE_MIN: usize = 8;
const PASSPHRASE_MAX: usize = 63;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load(global)?.redacted();
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Render(e.to_string()))?
                }
                _ => output::render_single(&global.output, &cfg, |_| String::new(), |_| String::new())?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::path(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = config::path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config(&Config::default(), &path)?;
            output::notice(&format!("Wrote {}", path.display()), global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassphrase => {
            let passphrase = dialoguer::Password::new()
                .with_prompt("Access point passphrase")
                .with_confirmation("Confirm passphrase", "Passphrases do not match")
                .interact()
                .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
            let len = passphrase.chars().count();
            if !(PASSPHRASE_MIN..=PASSPHRASE_MAX).contains(&len) {
                return Err(CliError::Validation {
                    field: "passphrase".into(),
                    reason: format!("must be {PASSPHRASE_MIN} to {PASSPHRASE_MAX} characters"),
                });
            }
            config::store_passphrase(&passphrase)?;
            output::notice("Passphrase stored in the system keyring", global.quiet);
            Ok(())
        }
    }
}
