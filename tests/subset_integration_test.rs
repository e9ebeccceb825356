use midas_extract::config::{Config, DataConfig, MetadataConfig};
use midas_extract::error::AppError;
use midas_extract::request::{run_extract, ExtractJob};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn test_config(root: &Path) -> Config {
    let metadata = root.join("metadata");
    let structures = metadata.join("table_structures");
    let data = root.join("data");
    fs::create_dir_all(&structures).unwrap();
    fs::create_dir_all(&data).unwrap();

    fs::write(
        structures.join("RHTB.txt"),
        "ID\nID_TYPE\nOB_TIME\nSRC_ID\nPRCP_AMT\n",
    )
    .unwrap();
    fs::write(
        structures.join("GLTB.txt"),
        "ID\nID_TYPE\nOB_TIME\nSRC_ID\nAIR_TEMPERATURE\n",
    )
    .unwrap();

    Config {
        metadata: MetadataConfig {
            source_file: metadata.join("SRCE.DATA"),
            source_columns_file: metadata.join("SOURCE.txt"),
            geog_area_file: metadata.join("GEAR.DATA"),
            geog_area_columns_file: metadata.join("GEOGRAPHIC_AREA.txt"),
            capability_file: metadata.join("SRCC.DATA"),
            capability_columns_file: structures.join("SCTB.txt"),
            table_structures_dir: structures,
        },
        data: DataConfig {
            partition_dir: data,
            file_prefix: "midas-data".to_string(),
            temp_dir: root.join(".temporary"),
        },
    }
}

fn write_partition(config: &Config, name: &str, lines: &[&str]) {
    fs::write(
        config.data.partition_dir.join(name),
        lines.join("\n"),
    )
    .unwrap();
}

fn extract_job(table: &str, start: &str, end: &str, output: &Path) -> ExtractJob {
    ExtractJob {
        table: table.to_string(),
        start: start.to_string(),
        end: end.to_string(),
        columns: None,
        conditions: vec![],
        station_ids: None,
        station_id_file: None,
        region: None,
        delimiter: "default".to_string(),
        output: output.to_path_buf(),
    }
}

#[test]
fn extraction_spans_partitions_and_respects_window() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_partition(
        &config,
        "midas-data_rhxx_200401-200406.txt",
        &[
            "1, CLBR, 2004-01-01 00:00, 214, 0.2",
            "2, CLBR, 2004-03-01 00:00, 926, 1.4",
            "3, CLBR, 2004-06-01 00:00, 214, 0.0",
        ],
    );
    write_partition(
        &config,
        "midas-data_rhxx_200407-200412.txt",
        &[
            "4, CLBR, 2004-08-01 00:00, 214, 2.2",
            "5, CLBR, 2004-11-01 00:00, 926, 0.4",
        ],
    );
    // Another table's partitions must not contribute rows.
    write_partition(
        &config,
        "midas-data_wmxx_200401-200412.txt",
        &["9, WIND, 2004-03-01 00:00, 214, 12.0"],
    );

    let output = dir.path().join("out.csv");
    let job = extract_job("RH", "200402010000", "200409010000", &output);
    let records = run_extract(&config, &job, None).unwrap();
    assert_eq!(records, 3);

    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "id, id_type, ob_time, src_id, prcp_amt");
    assert_eq!(lines[1], "2, CLBR, 2004-03-01 00:00, 926, 1.4");
    assert_eq!(lines[2], "3, CLBR, 2004-06-01 00:00, 214, 0.0");
    assert_eq!(lines[3], "4, CLBR, 2004-08-01 00:00, 214, 2.2");
}

#[test]
fn extraction_filters_by_station_file_and_writes_tabs() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_partition(
        &config,
        "midas-data_rhxx_200401-200412.txt",
        &[
            "1, CLBR, 2004-01-01 00:00, 214, 0.2",
            "2, CLBR, 2004-01-01 10:00, 926, 1.4",
            "3, CLBR, 2004-01-02 00:00, 303, 0.0",
        ],
    );

    let id_file = dir.path().join("ids.txt");
    fs::write(&id_file, "214\n303\n").unwrap();

    let output = dir.path().join("out.txt");
    let mut job = extract_job("RH", "200401010000", "200412312359", &output);
    job.station_id_file = Some(id_file);
    job.delimiter = "tab".to_string();

    let records = run_extract(&config, &job, None).unwrap();
    assert_eq!(records, 2);

    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "id\tid_type\tob_time\tsrc_id\tprcp_amt");
    assert_eq!(lines[1], "1\tCLBR\t2004-01-01 00:00\t214\t0.2");
    assert_eq!(lines[2], "3\tCLBR\t2004-01-02 00:00\t303\t0.0");
}

#[test]
fn extraction_with_no_matches_writes_explanation() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_partition(
        &config,
        "midas-data_rhxx_200401-200412.txt",
        &["1, CLBR, 2004-01-01 00:00, 214, 0.2"],
    );

    let output = dir.path().join("out.csv");
    // Window overlaps the partition's months but matches no rows.
    let job = extract_job("RH", "200412010000", "200412312359", &output);
    let records = run_extract(&config, &job, None).unwrap();
    assert_eq!(records, 0);

    let content = fs::read_to_string(&output).unwrap();
    assert!(content.starts_with("Your extraction request has run successfully"));

    // The temp directory holds no leftover buffers.
    let leftovers: Vec<_> = fs::read_dir(config.data.temp_dir)
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn extraction_projects_columns() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_partition(
        &config,
        "midas-data_rhxx_200401-200412.txt",
        &[
            "1, CLBR, 2004-01-01 00:00, 214, 0.2",
            "2, CLBR, 2004-01-01 10:00, 926, 1.4",
        ],
    );

    let output = dir.path().join("out.csv");
    let mut job = extract_job("RH", "200401010000", "200412312359", &output);
    job.columns = Some(vec![4, 5]);

    run_extract(&config, &job, None).unwrap();

    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    // The header always carries the table's full column list, even over
    // projected rows.
    assert_eq!(lines[0], "id, id_type, ob_time, src_id, prcp_amt");
    assert_eq!(lines[1], "214, 0.2");
    assert_eq!(lines[2], "926, 1.4");
}

#[test]
fn global_table_extraction_honours_region() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_partition(
        &config,
        "midas-data_glblwx-europe_200401-200412.txt",
        &["1, GL, 2004-01-01 00:00, 214, 3.5"],
    );
    write_partition(
        &config,
        "midas-data_glblwx-asia_200401-200412.txt",
        &["2, GL, 2004-01-01 00:00, 926, 9.5"],
    );

    let output = dir.path().join("out.csv");
    let mut job = extract_job("GL", "200401010000", "200412312359", &output);
    job.region = Some(midas_extract::catalog::Region::Europe);

    let records = run_extract(&config, &job, None).unwrap();
    assert_eq!(records, 1);

    let content = fs::read_to_string(&output).unwrap();
    assert!(content.contains("1, GL, 2004-01-01 00:00, 214, 3.5"));
    assert!(!content.contains("926"));
}

#[test]
fn unknown_table_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let job = extract_job("ZZZZ", "2004", "2005", &dir.path().join("out.csv"));
    let err = run_extract(&config, &job, None).unwrap_err();
    assert!(matches!(err, AppError::UnknownTable(_)));
}

#[test]
fn bad_window_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let job = extract_job("RH", "2006", "2004", &dir.path().join("out.csv"));
    let err = run_extract(&config, &job, None).unwrap_err();
    assert!(matches!(err, AppError::Parse(_)));
}
