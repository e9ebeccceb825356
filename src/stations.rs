use crate::bbox::BoundingBox;
use crate::error::{AppError, Result};
use crate::tables::{RefTable, TableSnapshot};
use crate::timewindow::date_field_to_long;
use std::collections::HashSet;
use tracing::{info, warn};

// SOURCE table columns
const COL_SRC_ID: &str = "SRC_ID";
const COL_LAT: &str = "HIGH_PRCN_LAT";
const COL_LON: &str = "HIGH_PRCN_LON";
const COL_LOC_AREA_ID: &str = "LOC_GEOG_AREA_ID";

// GEOGRAPHIC_AREA table columns
const COL_AREA_ID: &str = "WTHN_GEOG_AREA_ID";
const COL_AREA_TYPE: &str = "GEOG_AREA_TYPE";
const COL_AREA_NAME: &str = "GEOG_AREA_NAME";

// SRC_CAPABILITY table columns
const COL_ID_TYPE: &str = "ID_TYPE";
const COL_CAP_BGN: &str = "SRC_CAP_BGN_DATE";
const COL_CAP_END: &str = "SRC_CAP_END_DATE";

/// Selection criteria for a station search. Exactly one of `counties` or
/// `bbox` drives the spatial phase; data types and the time bounds narrow
/// the result by reported capability.
#[derive(Debug, Clone, Default)]
pub struct StationQuery {
    pub counties: Vec<String>,
    pub bbox: Option<BoundingBox>,
    pub data_types: Vec<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Resolves a station query against a loaded table snapshot, returning
/// matching src_ids de-duplicated in first-match order.
pub fn resolve_stations(tables: &TableSnapshot, query: &StationQuery) -> Result<Vec<String>> {
    let spatial = if !query.counties.is_empty() {
        stations_by_counties(tables, &query.counties)?
    } else if let Some(bbox) = &query.bbox {
        stations_by_bbox(&tables.source, bbox)?
    } else {
        return Err(AppError::InvalidSelector(
            "must provide either a list of counties or bounding box coordinates".to_string(),
        ));
    };

    let filtered = filter_by_capability(&tables.capabilities, spatial, query)?;
    info!("Number of stations found: {}", filtered.len());
    Ok(filtered)
}

fn stations_by_bbox(source: &RefTable, bbox: &BoundingBox) -> Result<Vec<String>> {
    info!(
        "Searching within a box of (N - S) {} - {} and (W - E) {} - {}",
        bbox.north, bbox.south, bbox.west, bbox.east
    );

    let lat_col = source.column_index(COL_LAT)?;
    let lon_col = source.column_index(COL_LON)?;
    let src_id_col = source.column_index(COL_SRC_ID)?;

    let mut matching = Vec::new();
    for row in &source.rows {
        let cells = RefTable::cells(row);
        let (Some(lat_cell), Some(lon_cell), Some(src_id)) =
            (cells.get(lat_col), cells.get(lon_col), cells.get(src_id_col))
        else {
            warn!("Skipping short station row: {}", row);
            continue;
        };

        let (Ok(lat), Ok(lon)) = (lat_cell.parse::<f64>(), lon_cell.parse::<f64>()) else {
            warn!("Skipping station row with unparseable coordinates: {}", row);
            continue;
        };

        if bbox.contains(lat, lon) {
            matching.push(src_id.to_string());
        }
    }

    Ok(matching)
}

fn stations_by_counties(tables: &TableSnapshot, counties: &[String]) -> Result<Vec<String>> {
    let counties: Vec<String> = counties.iter().map(|c| c.to_uppercase()).collect();
    info!("Counties to filter on: {:?}", counties);

    let geog = &tables.geog_areas;
    let area_type_col = geog.column_index(COL_AREA_TYPE)?;
    let area_id_col = geog.column_index(COL_AREA_ID)?;
    let area_name_col = geog.column_index(COL_AREA_NAME)?;

    let mut county_codes: HashSet<String> = HashSet::new();
    for row in &geog.rows {
        let cells = RefTable::cells(row);
        let (Some(area_type), Some(area_id), Some(area_name)) = (
            cells.get(area_type_col),
            cells.get(area_id_col),
            cells.get(area_name_col),
        ) else {
            warn!("Skipping short geographic area row: {}", row);
            continue;
        };

        if area_type.to_uppercase() == "COUNTY" && counties.contains(&area_name.to_uppercase()) {
            county_codes.insert(area_id.to_string());
        }
    }

    let source = &tables.source;
    let area_col = source.column_index(COL_LOC_AREA_ID)?;
    let src_id_col = source.column_index(COL_SRC_ID)?;

    let mut matching = Vec::new();
    for row in &source.rows {
        let cells = RefTable::cells(row);
        let (Some(area_id), Some(src_id)) = (cells.get(area_col), cells.get(src_id_col)) else {
            warn!("Skipping short station row: {}", row);
            continue;
        };
        if county_codes.contains(*area_id) {
            matching.push(src_id.to_string());
        }
    }

    Ok(matching)
}

/// Retains stations with at least one capability row matching the requested
/// data types and time bounds. When neither is requested the join is
/// skipped and the spatial result returned unchanged.
fn filter_by_capability(
    capabilities: &RefTable,
    spatial: Vec<String>,
    query: &StationQuery,
) -> Result<Vec<String>> {
    if query.data_types.is_empty() && query.start.is_none() && query.end.is_none() {
        return Ok(spatial);
    }

    let data_types: Vec<String> = query.data_types.iter().map(|d| d.to_lowercase()).collect();
    if !data_types.is_empty() {
        info!("Filtering on data types: {:?}", data_types);
    }
    if let Some(start) = query.start {
        info!("From: {}", start);
    }
    if let Some(end) = query.end {
        info!("To: {}", end);
    }

    let id_type_col = capabilities.column_index(COL_ID_TYPE)?;
    let src_id_col = capabilities.column_index(COL_SRC_ID)?;
    let bgn_col = capabilities.column_index(COL_CAP_BGN)?;
    let end_col = capabilities.column_index(COL_CAP_END)?;

    let spatial_set: HashSet<&str> = spatial.iter().map(String::as_str).collect();
    let mut selected = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for row in &capabilities.rows {
        let cells = RefTable::cells(row);
        let Some(src_id) = cells.get(src_id_col) else {
            continue;
        };
        if !spatial_set.contains(src_id) {
            continue;
        }

        let data_type_allowed = if data_types.is_empty() {
            true
        } else {
            cells
                .get(id_type_col)
                .map(|t| data_types.contains(&t.to_lowercase()))
                .unwrap_or(false)
        };

        // The capability period must overlap the requested bounds: a
        // station still measuring at the window start and one that began
        // before the window end both qualify.
        let mut time_allowed = true;
        if let Some(start) = query.start {
            let cap_end = cells.get(end_col).and_then(|c| date_field_to_long(c));
            if cap_end.map(|e| start > e).unwrap_or(true) {
                time_allowed = false;
            }
        }
        if let Some(end) = query.end {
            // A capability row with no readable begin date is not excluded;
            // only a begin date after the window end disqualifies it.
            let cap_bgn = cells.get(bgn_col).and_then(|c| date_field_to_long(c));
            if cap_bgn.map(|b| end < b).unwrap_or(false) {
                time_allowed = false;
            }
        }

        if data_type_allowed && time_allowed && seen.insert(src_id.to_string()) {
            selected.push(src_id.to_string());
        }
    }

    info!(
        "Original list length: {}, selected after capability filtering: {}",
        spatial.len(),
        selected.len()
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, columns: &[&str], rows: &[&str]) -> RefTable {
        RefTable {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn snapshot() -> TableSnapshot {
        TableSnapshot {
            source: table(
                "SOURCE",
                &["SRC_ID", "HIGH_PRCN_LAT", "HIGH_PRCN_LON", "LOC_GEOG_AREA_ID"],
                &[
                    "214, 52.0, 0.2, DEV",
                    "926, 50.4, -4.1, CORN",
                    "303, 55.0, -3.0, DUMF",
                    "777, bad, 0.2, NONE",
                ],
            ),
            geog_areas: table(
                "GEOG",
                &["WTHN_GEOG_AREA_ID", "GEOG_AREA_TYPE", "GEOG_AREA_NAME"],
                &[
                    "DEV, COUNTY, DEVON",
                    "CORN, COUNTY, CORNWALL",
                    "DUMF, COUNTY, DUMFRIES",
                    "UK, COUNTRY, UNITED KINGDOM",
                ],
            ),
            capabilities: table(
                "SRCC",
                &["SRC_ID", "ID_TYPE", "SRC_CAP_BGN_DATE", "SRC_CAP_END_DATE"],
                &[
                    "214, RAIN, 1999-01-01 00:00, 2010-01-01 00:00",
                    "214, WIND, 1950-01-01 00:00, 1960-01-01 00:00",
                    "926, WIND, 2000-01-01 00:00, 2005-01-01 00:00",
                    "303, RAIN, 1980-01-01 00:00, 1985-01-01 00:00",
                ],
            ),
        }
    }

    #[test]
    fn test_bbox_resolution_hit() {
        let query = StationQuery {
            bbox: Some(BoundingBox::new(53.0, -1.0, 51.0, 1.0).unwrap()),
            ..Default::default()
        };
        let ids = resolve_stations(&snapshot(), &query).unwrap();
        assert_eq!(ids, vec!["214"]);
    }

    #[test]
    fn test_bbox_resolution_miss_on_longitude() {
        let query = StationQuery {
            bbox: Some(BoundingBox::new(53.0, -1.0, 51.0, -0.5).unwrap()),
            ..Default::default()
        };
        let ids = resolve_stations(&snapshot(), &query).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_county_resolution_case_insensitive() {
        let query = StationQuery {
            counties: vec!["devon".to_string(), "CORNWALL".to_string()],
            ..Default::default()
        };
        let ids = resolve_stations(&snapshot(), &query).unwrap();
        assert_eq!(ids, vec!["214", "926"]);
    }

    #[test]
    fn test_county_match_ignores_coordinates() {
        // The county phase joins on area IDs only; a station with
        // unparseable coordinates still resolves.
        let mut tables = snapshot();
        tables.source.rows.push("888, bad, bad, DEV".to_string());
        let query = StationQuery {
            counties: vec!["DEVON".to_string()],
            ..Default::default()
        };
        let ids = resolve_stations(&tables, &query).unwrap();
        assert_eq!(ids, vec!["214", "888"]);
    }

    #[test]
    fn test_counties_take_precedence_over_bbox() {
        let query = StationQuery {
            counties: vec!["DUMFRIES".to_string()],
            bbox: Some(BoundingBox::new(53.0, -1.0, 51.0, 1.0).unwrap()),
            ..Default::default()
        };
        let ids = resolve_stations(&snapshot(), &query).unwrap();
        assert_eq!(ids, vec!["303"]);
    }

    #[test]
    fn test_no_selector_is_error() {
        let err = resolve_stations(&snapshot(), &StationQuery::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidSelector(_)));
    }

    #[test]
    fn test_capability_data_type_filter() {
        let query = StationQuery {
            counties: vec!["DEVON".to_string(), "CORNWALL".to_string()],
            data_types: vec!["rain".to_string()],
            ..Default::default()
        };
        let ids = resolve_stations(&snapshot(), &query).unwrap();
        assert_eq!(ids, vec!["214"]);
    }

    #[test]
    fn test_capability_time_filter() {
        // Station 214's RAIN capability ended 2010; a 2015 start excludes
        // it unless the 1950s WIND row is also ruled out.
        let query = StationQuery {
            counties: vec!["DEVON".to_string()],
            start: Some(201501010000),
            ..Default::default()
        };
        let ids = resolve_stations(&snapshot(), &query).unwrap();
        assert!(ids.is_empty());

        let query = StationQuery {
            counties: vec!["DEVON".to_string()],
            start: Some(200001010000),
            end: Some(200501010000),
            ..Default::default()
        };
        let ids = resolve_stations(&snapshot(), &query).unwrap();
        assert_eq!(ids, vec!["214"]);
    }

    #[test]
    fn test_capability_filter_is_narrowing() {
        let base = StationQuery {
            bbox: Some(BoundingBox::new(60.0, -10.0, 45.0, 5.0).unwrap()),
            ..Default::default()
        };
        let unfiltered = resolve_stations(&snapshot(), &base).unwrap();

        let narrowed_query = StationQuery {
            data_types: vec!["RAIN".to_string()],
            start: Some(200001010000),
            ..base.clone()
        };
        let narrowed = resolve_stations(&snapshot(), &narrowed_query).unwrap();

        for id in &narrowed {
            assert!(unfiltered.contains(id));
        }
        assert!(narrowed.len() <= unfiltered.len());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let query = StationQuery {
            bbox: Some(BoundingBox::new(60.0, -10.0, 45.0, 5.0).unwrap()),
            data_types: vec!["WIND".to_string()],
            ..Default::default()
        };
        let first = resolve_stations(&snapshot(), &query).unwrap();
        let second = resolve_stations(&snapshot(), &query).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_deduplicates_capability_matches() {
        let mut tables = snapshot();
        tables
            .capabilities
            .rows
            .push("214, DCNN, 1999-01-01 00:00, 2010-01-01 00:00".to_string());
        let query = StationQuery {
            counties: vec!["DEVON".to_string()],
            start: Some(200001010000),
            ..Default::default()
        };
        let ids = resolve_stations(&tables, &query).unwrap();
        assert_eq!(ids, vec!["214"]);
    }
}
