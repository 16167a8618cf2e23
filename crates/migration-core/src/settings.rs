use crate::error::ConfigurationError;
use model::Phase;
use std::str::FromStr;
use url::Url;

/// Parsed form of a `migration://?source=<url>&target=<url>&mode=<phase>`
/// settings string (spec §4.6). Resolving each `source`/`target` value
/// through [`Url::parse`] first means percent-encoding inside the nested
/// connection URL (`:` `/` `?` `=` `&` `%` and `+`-as-space) is decoded the
/// same way the outer query string's `query_pairs` already decodes it,
/// without hand-rolling a second decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    pub source_url: String,
    pub target_url: String,
    pub mode: Phase,
}

impl MigrationSettings {
    /// Parses a `migration://` settings URL. `mode` is optional and
    /// defaults to [`Phase::SourceOnly`] when omitted; `source` and
    /// `target` are mandatory.
    pub fn parse(settings_url: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(settings_url)
            .map_err(|e| ConfigurationError::MalformedUrl(e.to_string()))?;

        let mut source_url = None;
        let mut target_url = None;
        let mut mode = Phase::SourceOnly;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "source" => source_url = Some(value.into_owned()),
                "target" => target_url = Some(value.into_owned()),
                "mode" => {
                    mode = Phase::from_str(value.as_ref())
                        .map_err(|_| ConfigurationError::UnknownPhase(value.into_owned()))?;
                }
                _ => {}
            }
        }

        Ok(MigrationSettings {
            source_url: source_url.ok_or(ConfigurationError::MissingParameter("source"))?,
            target_url: target_url.ok_or(ConfigurationError::MissingParameter("target"))?,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_settings_url() {
        let settings = MigrationSettings::parse(
            "migration://?source=postgres%3A%2F%2Flocalhost%2Fdb&target=mongodb%3A%2F%2Flocalhost%2Fdb&mode=DUAL_WRITE_READ_SOURCE",
        )
        .unwrap();

        assert_eq!(settings.source_url, "postgres://localhost/db");
        assert_eq!(settings.target_url, "mongodb://localhost/db");
        assert_eq!(settings.mode, Phase::DualWriteReadSource);
    }

    #[test]
    fn defaults_mode_to_source_only() {
        let settings =
            MigrationSettings::parse("migration://?source=postgres%3A%2F%2Fa&target=mongodb%3A%2F%2Fb").unwrap();
        assert_eq!(settings.mode, Phase::SourceOnly);
    }

    #[test]
    fn rejects_missing_source() {
        let err = MigrationSettings::parse("migration://?target=mongodb%3A%2F%2Fb").unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingParameter("source")));
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = MigrationSettings::parse(
            "migration://?source=a&target=b&mode=NOT_A_REAL_PHASE",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPhase(_)));
    }
}
