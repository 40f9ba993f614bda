use std::{fmt::Display, str::FromStr};

use profile_store::{keys, ProfileStore};
use tracing::warn;

use crate::{
    error::SessionError,
    session::{ConnectionParams, AUTO_DETECT_FIRMWARE, DEFAULT_BAUD},
};

/// Builds the connection parameters for `profile_name` on `port`.
///
/// Missing or malformed profile values fall back to defaults; only an empty
/// selection or an unknown profile rejects the connect intent.
pub fn assemble_connection_params(
    store: &dyn ProfileStore,
    profile_name: &str,
    port: &str,
) -> Result<ConnectionParams, SessionError> {
    let profile_name = profile_name.trim();
    if profile_name.is_empty() {
        return Err(SessionError::NoProfileSelected);
    }
    let port = port.trim();
    if port.is_empty() {
        return Err(SessionError::NoPortSelected);
    }

    let stored = store
        .get_profile(profile_name)
        .ok_or_else(|| SessionError::UnknownProfile(profile_name.to_string()))?;

    let baud = parse_or_default(profile_name, keys::BAUD, stored.baud.as_deref(), DEFAULT_BAUD);
    let baud = if baud == 0 {
        warn!(profile = profile_name, "baud rate of zero; using {DEFAULT_BAUD}");
        DEFAULT_BAUD
    } else {
        baud
    };

    let firmware = stored
        .firmware
        .as_deref()
        .map(str::trim)
        .filter(|firmware| !firmware.is_empty())
        .unwrap_or(AUTO_DETECT_FIRMWARE)
        .to_string();

    Ok(ConnectionParams {
        profile_name: profile_name.to_string(),
        port: port.to_string(),
        baud,
        firmware,
        bed_temp_max: parse_or_default(
            profile_name,
            keys::BED_TEMP_MAX,
            stored.bed_temp_max.as_deref(),
            0,
        ),
        extruder_temp_max: parse_or_default(
            profile_name,
            keys::EXTRUDER_TEMP_MAX,
            stored.extruder_temp_max.as_deref(),
            0,
        ),
        post_pause: stored.post_pause.unwrap_or_default(),
    })
}

fn parse_or_default<T>(profile: &str, key: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(text) => text.parse().unwrap_or_else(|_| {
            warn!(
                profile,
                key,
                value = text,
                "malformed profile value; using default {default}"
            );
            default
        }),
    }
}
