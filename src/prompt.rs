// AP Provisioner - Operator Prompts
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Interactive collection of parameters the command line left out.
//!
//! Only the pieces with no settings default are ever asked for; in
//! practice that is the passphrase, which is deliberately never stored.
//! Prompt validators reuse the same checks as [`ApConfigInput::validate`]
//! so the operator hears about a bad value immediately instead of after
//! the pipeline starts.

use dialoguer::{Confirm, Input, Password};

use crate::models::config::ApConfigInput;
use crate::models::error::{Error, Result};
use crate::models::validation;

fn prompt_err(e: dialoguer::Error) -> Error {
    Error::Prompt(e.to_string())
}

/// Ask for any field still empty after flags and settings were applied.
///
/// With `assume_yes` nothing is asked; a missing passphrase is then a
/// hard error because there is no other way to obtain one.
pub fn fill_missing(input: &mut ApConfigInput, assume_yes: bool) -> Result<()> {
    if input.ssid.trim().is_empty() {
        if assume_yes {
            return Err(Error::Prompt(
                "SSID required in non-interactive mode; pass --ssid".to_string(),
            ));
        }
        input.ssid = Input::new()
            .with_prompt("Network name (SSID)")
            .validate_with(|value: &String| -> std::result::Result<(), String> {
                validation::validate_ssid(value)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
            .interact_text()
            .map_err(prompt_err)?;
    }

    if input.passphrase.is_empty() {
        if assume_yes {
            return Err(Error::Prompt(
                "passphrase required in non-interactive mode; pass --passphrase".to_string(),
            ));
        }
        input.passphrase = Password::new()
            .with_prompt(format!("WPA2 passphrase for \"{}\"", input.ssid.trim()))
            .with_confirmation("Repeat passphrase", "Passphrases do not match")
            .validate_with(|value: &String| -> std::result::Result<(), String> {
                validation::validate_passphrase(value).map_err(|e| e.to_string())
            })
            .interact()
            .map_err(prompt_err)?;
    }

    Ok(())
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool> {
    if yes_flag {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}
