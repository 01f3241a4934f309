//! META rows for one identifier.
//!
//! One row per metric, in output order, combining the provider defaults
//! with a generated code and description:
//!
//! ```text
//! CODE         IT0005580094.OFR.ITBI.M
//! DESCRIPTION  ISIN:IT0005580094;BTP 3,15% 01.10.2031:amounts: offered
//! ```

use crate::config::{MetadataDefaults, RunConfig, SeriesDef};
use crate::models::MetadataRow;

pub fn series_code(identifier: &str, def: &SeriesDef) -> String {
    format!("{}.{}", identifier, def.suffix)
}

pub fn series_description(identifier: &str, description: &str, def: &SeriesDef) -> String {
    format!("ISIN:{};{}:{}", identifier, description, def.label)
}

fn metadata_row(code: String, description: String, defaults: &MetadataDefaults) -> MetadataRow {
    MetadataRow {
        code,
        description,
        frequency: defaults.frequency.clone(),
        multiplier: defaults.multiplier.clone(),
        aggregation_type: defaults.aggregation_type.clone(),
        unit_type: defaults.unit_type.clone(),
        data_type: defaults.data_type.clone(),
        data_unit: defaults.data_unit.clone(),
        seasonally_adjusted: defaults.seasonally_adjusted.clone(),
        annualized: defaults.annualized.clone(),
        provider_measure_url: defaults.provider_measure_url.clone(),
        provider: defaults.provider.clone(),
        source: defaults.source.clone(),
        source_description: defaults.source_description.clone(),
        country: defaults.country.clone(),
        dataset: defaults.dataset.clone(),
    }
}

/// Exactly one row per configured series, in output order.
pub fn metadata_rows(identifier: &str, description: &str, config: &RunConfig) -> Vec<MetadataRow> {
    config
        .ordered_series()
        .into_iter()
        .map(|def| {
            metadata_row(
                series_code(identifier, def),
                series_description(identifier, description, def),
                &config.metadata,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::METADATA_COLUMNS;

    #[test]
    fn test_codes_and_descriptions() {
        let config = RunConfig::default();
        let rows = metadata_rows("IT0005580094", "BTP 3,15% 01.10.2031", &config);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].code, "IT0005580094.OFR.ITBI.M");
        assert_eq!(rows[4].code, "IT0005580094.ASGN.ITBI.M");
        assert_eq!(
            rows[1].description,
            "ISIN:IT0005580094;BTP 3,15% 01.10.2031:amounts: minimum offered"
        );
    }

    #[test]
    fn test_every_row_has_all_columns() {
        let config = RunConfig::default();
        for row in metadata_rows("X", "", &config) {
            let values = row.values();
            assert_eq!(values.len(), METADATA_COLUMNS.len());
            assert_eq!(values[2], "M");
            assert_eq!(values[9], "");
            assert_eq!(values[13], "Banca d'Italia");
            assert_eq!(values[15], "ITBI");
        }
    }

    #[test]
    fn test_empty_description_keeps_separators() {
        let config = RunConfig::default();
        let rows = metadata_rows("IT0000000001", "", &config);
        assert_eq!(rows[3].description, "ISIN:IT0000000001;:amounts: required");
    }
}
