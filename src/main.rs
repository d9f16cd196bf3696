#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use std::path::Path;

use anyhow::{anyhow, bail, Context};
use fido2_rp::{
    settings::Fido2Settings,
    webauthn::{generate_user_handle, UserEntity},
    AssertionOptionsInput, AssertionRequest, AttestationOptionsInput, AttestationRequest,
    ExpectedAssertion, ExpectedAttestation, Fido2Service,
};
use serde::de::DeserializeOwned;

const USAGE: &str = "Usage: fido2-rp <command>

Commands:
  attestation-options <name> [display-name]     Registration options for a new user
  assertion-options                              Authentication options
  attestation-result <request.json> <expected.json>
  assertion-result <request.json> <expected.json>

Settings are read from Settings.toml, $FIDO2_CONFIG_DIR/Settings.toml and
environment variables. An expected.json without \"origin\" uses rp_origin;
\"factor\" (first, second or either) is always required.";

fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also initializes the logger
    let settings = Fido2Settings::load().map_err(|e| anyhow!("Failed to load settings: {e}"))?;
    let service =
        Fido2Service::new(settings.relying_party.clone()).context("Invalid relying party settings")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        bail!("No command given");
    };

    let output = match command.as_str() {
        "attestation-options" => {
            let Some(name) = args.get(1) else {
                bail!("attestation-options needs a user name");
            };
            let display_name = args.get(2).unwrap_or(name);
            let user = UserEntity {
                id: generate_user_handle()?,
                name: name.clone(),
                display_name: display_name.clone(),
            };
            serde_json::to_value(service.attestation_options(AttestationOptionsInput::new(user))?)?
        }
        "assertion-options" => {
            serde_json::to_value(service.assertion_options(AssertionOptionsInput::default())?)?
        }
        "attestation-result" => {
            let (request_path, expected_path) = file_args(&args)?;
            let request: AttestationRequest = read_json(request_path)?;
            let expected: ExpectedAttestation =
                read_expectations(expected_path, &settings.relying_party.rp_origin)?;
            let result = service
                .attestation_result(&request, &expected)
                .context("Registration rejected")?;
            serde_json::to_value(&result)?
        }
        "assertion-result" => {
            let (request_path, expected_path) = file_args(&args)?;
            let request: AssertionRequest = read_json(request_path)?;
            let expected: ExpectedAssertion =
                read_expectations(expected_path, &settings.relying_party.rp_origin)?;
            let result = service
                .assertion_result(&request, &expected)
                .context("Authentication rejected")?;
            serde_json::to_value(&result)?
        }
        other => {
            eprintln!("{USAGE}");
            bail!("Unknown command: {other}");
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn file_args(args: &[String]) -> anyhow::Result<(&Path, &Path)> {
    match (args.get(1), args.get(2)) {
        (Some(request), Some(expected)) => Ok((Path::new(request), Path::new(expected))),
        _ => bail!("{} needs <request.json> <expected.json>", args[0]),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Expectations file, with the configured origin filled in when absent
fn read_expectations<T: DeserializeOwned>(path: &Path, default_origin: &str) -> anyhow::Result<T> {
    let mut value: serde_json::Value = read_json(path)?;
    if let Some(object) = value.as_object_mut() {
        object
            .entry("origin")
            .or_insert_with(|| serde_json::Value::String(default_origin.to_string()));
    }
    serde_json::from_value(value)
        .with_context(|| format!("Invalid expectations in {}", path.display()))
}
