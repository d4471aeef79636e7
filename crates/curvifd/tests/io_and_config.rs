//! Integration tests for file export, binary grids and run configuration.

use std::sync::Arc;

use curvifd::config::{load_run_config, FieldKind, GridConfig, Mapping, Operator, RunConfig};
use curvifd::grid::{Grid, StructuredGrid};
use curvifd::grid_function::{GridFunction, JacobianPolicy};
use curvifd::io::{read_grid_binary, read_table, write_grid_binary, write_table};

// ---------------------------------------------------------------------------
// Text export
// ---------------------------------------------------------------------------

#[test]
fn write_table_uses_header_and_row_major_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sum.txt");

    let grid: Arc<dyn Grid> = Arc::new(StructuredGrid::unit_square(2, 1));
    let gf = GridFunction::from_fn(grid, |x, y| x + y);
    write_table(&gf, &path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1 + 6);
    assert_eq!(lines[0], "1, 2");
    assert_eq!(lines[1], "0, 0, 0");
    assert_eq!(lines[2], "0.5, 0, 0.5");
    assert_eq!(lines[3], "1, 0, 1");
    assert_eq!(lines[4], "0, 1, 1");
    assert_eq!(lines[6], "1, 1, 2");
}

#[test]
fn read_table_parses_export() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.txt");

    let grid: Arc<dyn Grid> = Arc::new(StructuredGrid::uniform(3, 2, (-1.0, 1.0), (0.0, 2.0)));
    let gf = GridFunction::from_fn(grid, |x, y| x * y);
    write_table(&gf, &path).unwrap();

    let table = read_table(&path).unwrap();
    assert_eq!((table.y_extent, table.x_extent), (2, 3));
    assert_eq!(table.rows.len(), 12);
    for (row, &z) in table.rows.iter().zip(gf.values().as_slice()) {
        assert_eq!(row[0] * row[1], z);
        assert_eq!(row[2], z);
    }
}

#[test]
fn write_table_into_missing_directory_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.txt");
    let gf = GridFunction::new(Arc::new(StructuredGrid::unit_square(2, 2)));
    assert!(write_table(&gf, &path).is_err());
}

// ---------------------------------------------------------------------------
// Binary grids
// ---------------------------------------------------------------------------

#[test]
fn binary_grid_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.bin");

    let cfg = GridConfig {
        nx: 5,
        ny: 3,
        mapping: Mapping::Polar {
            r_inner: 0.5,
            r_outer: 1.5,
            theta_range: (0.0, 1.0),
        },
        ..GridConfig::default()
    };
    let grid = cfg.build();
    write_grid_binary(&grid, &path).unwrap();

    let bytes = std::fs::metadata(&path).unwrap().len();
    assert_eq!(bytes, 16 + 24 * 16);

    let loaded = read_grid_binary(&path).unwrap();
    assert_eq!(loaded, grid);
    assert_eq!(loaded.x_extent(), 5);
    assert_eq!(loaded.y_extent(), 3);
}

#[test]
fn read_grid_binary_reports_missing_file() {
    let err = read_grid_binary("/nonexistent/grid.bin").unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read grid file"));
}

#[test]
fn read_grid_binary_rejects_truncated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.bin");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2i64.to_ne_bytes());
    bytes.extend_from_slice(&2i64.to_ne_bytes());
    bytes.extend_from_slice(&[0u8; 32]);
    std::fs::write(&path, bytes).unwrap();
    assert!(read_grid_binary(&path).is_err());
}

// ---------------------------------------------------------------------------
// RunConfig defaults & serialization
// ---------------------------------------------------------------------------

#[test]
fn run_config_default_values() {
    let cfg = RunConfig::default();
    assert_eq!(cfg.grid.nx, 20);
    assert_eq!(cfg.grid.ny, 20);
    assert_eq!(cfg.grid.mapping, Mapping::Identity);
    assert_eq!(cfg.field, FieldKind::Harmonic);
    assert_eq!(cfg.operator, Operator::Laplace);
    assert_eq!(cfg.jacobian, JacobianPolicy::default());
    assert!(cfg.grid_file.is_none());
}

#[test]
fn run_config_round_trips_json() {
    let cfg = RunConfig {
        operator: Operator::DetJInv,
        jacobian: JacobianPolicy::Strict { threshold: 1e-10 },
        ..RunConfig::default()
    };
    let json = serde_json::to_string_pretty(&cfg).unwrap();
    assert!(json.contains("\"det_j_inv\""));
    assert!(json.contains("\"strict\""));
    let back: RunConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let json = r#"{
        "field": "sum",
        "grid": { "nx": 6, "mapping": { "shear": { "factor": 0.25 } } }
    }"#;
    let cfg: RunConfig = serde_json::from_str(json).unwrap();
    assert_eq!(cfg.field, FieldKind::Sum);
    assert_eq!(cfg.grid.nx, 6);
    assert_eq!(cfg.grid.ny, 20);
    assert_eq!(cfg.grid.mapping, Mapping::Shear { factor: 0.25 });
    assert_eq!(cfg.operator, Operator::Laplace);
}

#[test]
fn run_config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    std::fs::write(&path, r#"{ "operator": "du_dx", "field": "linear_x" }"#).unwrap();

    let cfg = load_run_config(&path).unwrap();
    assert_eq!(cfg.operator, Operator::DuDx);
    assert_eq!(cfg.field, FieldKind::LinearX);
}

#[test]
fn invalid_config_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(load_run_config(&path).is_err());
    assert!(load_run_config(dir.path().join("absent.json")).is_err());
}

#[test]
fn names_parse_from_strings() {
    assert_eq!("laplace".parse::<Operator>().unwrap(), Operator::Laplace);
    assert_eq!("DU_DY".parse::<Operator>().unwrap(), Operator::DuDy);
    assert!("curl".parse::<Operator>().is_err());
    assert_eq!("gaussian".parse::<FieldKind>().unwrap(), FieldKind::Gaussian);
    assert!("cubic".parse::<FieldKind>().is_err());
}

// ---------------------------------------------------------------------------
// Grid generation and evaluation
// ---------------------------------------------------------------------------

#[test]
fn grid_config_validation() {
    assert!(GridConfig::default().validate().is_ok());
    let too_coarse = GridConfig {
        nx: 1,
        ..GridConfig::default()
    };
    assert!(too_coarse.validate().is_err());
    let inverted = GridConfig {
        mapping: Mapping::Polar {
            r_inner: 2.0,
            r_outer: 1.0,
            theta_range: (0.0, 1.0),
        },
        ..GridConfig::default()
    };
    assert!(inverted.validate().is_err());
}

#[test]
fn shear_mapping_offsets_rows() {
    let cfg = GridConfig {
        nx: 2,
        ny: 2,
        mapping: Mapping::Shear { factor: 0.5 },
        ..GridConfig::default()
    };
    let grid = cfg.build();
    let p = grid.point(2, 0);
    assert!((p.x - 0.5).abs() < 1e-12);
    assert!((p.y - 1.0).abs() < 1e-12);
}

#[test]
fn default_run_evaluates_harmonic_laplacian() {
    let result = RunConfig::default().evaluate().unwrap();
    assert_eq!(result.values().shape(), (21, 21));
    assert!(result.max_abs_interior() < 1e-6);
}

#[test]
fn evaluate_on_loaded_grid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.bin");
    write_grid_binary(&StructuredGrid::unit_square(6, 6), &path).unwrap();

    let cfg = RunConfig {
        grid_file: Some(path),
        field: FieldKind::LinearX,
        operator: Operator::DuDx,
        ..RunConfig::default()
    };
    let result = cfg.evaluate().unwrap();
    assert_eq!(result.values().shape(), (7, 7));
    assert!(result.values().as_slice().iter().all(|v| (v - 1.0).abs() < 1e-6));
}

#[test]
fn evaluate_rejects_invalid_grid() {
    let cfg = RunConfig {
        grid: GridConfig {
            ny: 1,
            ..GridConfig::default()
        },
        ..RunConfig::default()
    };
    assert!(cfg.evaluate().is_err());
}
