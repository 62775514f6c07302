use std::path::Path;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::error::GraphError;
use crate::store::{Properties, ReadSession, StoredNode, WriteSession, render_value};

pub const AIRPORT: &str = "Airport";
pub const FLIGHT: &str = "FLIGHT";

pub const NODES_FILE: &str = "nodes.csv";
pub const EDGES_FILE: &str = "edges.csv";

const UNKNOWN: &str = "unknown";

// Empty cells decode to `None` and are never stored.
#[derive(Debug, Deserialize)]
pub struct AirportRow {
    id: Option<i64>,
    iata: Option<String>,
    icao: Option<String>,
    city: Option<String>,
    descr: Option<String>,
    region: Option<String>,
    runways: Option<i64>,
    longest: Option<i64>,
    altitude: Option<i64>,
    country: Option<String>,
    continent: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl AirportRow {
    fn properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert("id".to_string(), json!(self.id));
        properties.insert("iata".to_string(), json!(self.iata));
        properties.insert("icao".to_string(), json!(self.icao));
        properties.insert("city".to_string(), json!(self.city));
        properties.insert("description".to_string(), json!(self.descr));
        properties.insert("region".to_string(), json!(self.region));
        properties.insert("runways".to_string(), json!(self.runways));
        properties.insert("longest".to_string(), json!(self.longest));
        properties.insert("altitude".to_string(), json!(self.altitude));
        properties.insert("country".to_string(), json!(self.country));
        properties.insert("continent".to_string(), json!(self.continent));
        properties.insert("latitude".to_string(), json!(self.lat));
        properties.insert("longitude".to_string(), json!(self.lon));
        properties
    }
}

#[derive(Debug, Deserialize)]
pub struct FlightRow {
    src: String,
    dest: String,
    dist: Option<i64>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub airports: usize,
    pub flights: usize,
    pub unmatched_rows: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GraphNode {
    pub id: Value,
    pub city: Value,
    pub country: Value,
    pub continent: Value,
    pub lat: Value,
    pub lon: Value,
    pub altitude: Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GraphEdge {
    pub source: Value,
    pub target: Value,
    pub distance: Value,
}

/// Parses every row of a CSV file with headers; the first bad row fails the whole read.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, GraphError> {
    let to_error = |source| GraphError::Source {
        path: path.display().to_string(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(to_error)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(to_error)
}

/// Text dump of every airport followed by every flight; `None` when both are empty.
pub fn describe_contents(session: &ReadSession) -> Result<Option<Vec<String>>, GraphError> {
    let airports = session.nodes(Some(AIRPORT))?;
    let flights = flights_by_code(session)?;
    if airports.is_empty() && flights.is_empty() {
        return Ok(None);
    }

    let mut lines = Vec::with_capacity(airports.len() + flights.len() + 3);
    lines.push("Airports in the database:".to_string());
    for airport in &airports {
        lines.push(format!(
            " - {} ({}): {} with {} runways",
            text(airport, "iata"),
            text(airport, "city"),
            text(airport, "description"),
            text(airport, "runways"),
        ));
    }
    lines.push(" ".to_string());
    lines.push("Flight connections:".to_string());
    for flight in &flights {
        lines.push(format!(
            " - {} -> {} ({} miles)",
            render_value(Some(&flight.source)).unwrap_or_else(|| UNKNOWN.to_string()),
            render_value(Some(&flight.target)).unwrap_or_else(|| UNKNOWN.to_string()),
            render_value(Some(&flight.distance)).unwrap_or_else(|| UNKNOWN.to_string()),
        ));
    }
    Ok(Some(lines))
}

/// Replaces the whole graph with the given airports and the flights whose
/// endpoints match an airport code.
pub fn replace_with_rows(
    session: &mut WriteSession,
    airports: &[AirportRow],
    flights: &[FlightRow],
) -> Result<ImportCounts, GraphError> {
    session.clear()?;
    tracing::info!("database cleared");

    let mut counts = ImportCounts::default();
    for row in airports {
        session.create_node(AIRPORT, &row.properties())?;
        counts.airports += 1;
    }

    for row in flights {
        let sources = session.nodes_where(AIRPORT, "iata", &json!(row.src))?;
        let targets = session.nodes_where(AIRPORT, "iata", &json!(row.dest))?;
        if sources.is_empty() || targets.is_empty() {
            counts.unmatched_rows += 1;
            continue;
        }
        let mut properties = Properties::new();
        properties.insert("distance".to_string(), json!(row.dist));
        for source in &sources {
            for target in &targets {
                session.create_edge(&source.key, &target.key, FLIGHT, &properties)?;
                counts.flights += 1;
            }
        }
    }
    Ok(counts)
}

pub fn graph_data(session: &ReadSession) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), GraphError> {
    let nodes = session
        .nodes(Some(AIRPORT))?
        .iter()
        .map(|airport| GraphNode {
            id: field(airport, "iata"),
            city: field(airport, "city"),
            country: field(airport, "country"),
            continent: field(airport, "continent"),
            lat: field(airport, "latitude"),
            lon: field(airport, "longitude"),
            altitude: field(airport, "altitude"),
        })
        .collect();
    Ok((nodes, flights_by_code(session)?))
}

pub fn airports_with_runways(session: &ReadSession, count: i64) -> Result<Vec<String>, GraphError> {
    Ok(session
        .nodes_where(AIRPORT, "runways", &json!(count))?
        .iter()
        .filter_map(|airport| render_value(airport.property("iata")))
        .collect())
}

fn flights_by_code(session: &ReadSession) -> Result<Vec<GraphEdge>, GraphError> {
    let mut flights = Vec::new();
    for edge in session.edges(Some(FLIGHT))? {
        let (Some(from), Some(to)) = (session.node(&edge.from)?, session.node(&edge.to)?) else {
            continue;
        };
        if from.label != AIRPORT || to.label != AIRPORT {
            continue;
        }
        flights.push(GraphEdge {
            source: field(&from, "iata"),
            target: field(&to, "iata"),
            distance: edge.property("distance").cloned().unwrap_or(Value::Null),
        });
    }
    Ok(flights)
}

fn field(node: &StoredNode, name: &str) -> Value {
    node.property(name).cloned().unwrap_or(Value::Null)
}

fn text(node: &StoredNode, name: &str) -> String {
    render_value(node.property(name)).unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphDb;
    use std::path::PathBuf;
    use std::time::Duration;

    struct TempFiles(Vec<PathBuf>);

    impl Drop for TempFiles {
        fn drop(&mut self) {
            for path in &self.0 {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    fn temp_path(name: &str, extension: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "airgraph_airports_{}_{}.{}",
            name,
            std::process::id(),
            extension
        ))
    }

    fn open_temp(name: &str) -> (GraphDb, PathBuf) {
        let path = temp_path(name, "redb");
        let _ = std::fs::remove_file(&path);
        let graph = GraphDb::open(&path, Duration::from_secs(5)).expect("open failed");
        (graph, path)
    }

    fn airport(id: i64, iata: &str, runways: i64) -> AirportRow {
        AirportRow {
            id: Some(id),
            iata: Some(iata.to_string()),
            icao: Some(format!("K{iata}")),
            city: Some(format!("{iata} City")),
            descr: Some(format!("{iata} International")),
            region: Some("US-XX".to_string()),
            runways: Some(runways),
            longest: Some(10000),
            altitude: Some(500),
            country: Some("US".to_string()),
            continent: Some("NA".to_string()),
            lat: Some(33.5),
            lon: Some(-84.25),
        }
    }

    fn flight(src: &str, dest: &str, dist: i64) -> FlightRow {
        FlightRow {
            src: src.to_string(),
            dest: dest.to_string(),
            dist: Some(dist),
        }
    }

    #[test]
    fn csv_rows_parse_with_empty_numeric_cells() {
        let path = temp_path("nodes", "csv");
        let _files = TempFiles(vec![path.clone()]);
        std::fs::write(
            &path,
            "id,iata,icao,city,descr,region,runways,longest,altitude,country,continent,lat,lon\n\
             1,ATL,KATL,Atlanta,Hartsfield - Jackson Atlanta International Airport,US-GA,5,12390,1026,US,NA,33.6367,-84.4281\n\
             2,XXX,,Nowhere,Unknown field,,,,,ZZ,AN,,\n",
        )
        .expect("write csv");

        let rows: Vec<AirportRow> = read_rows(&path).expect("parse failed");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].runways, Some(5));
        assert_eq!(rows[0].lat, Some(33.6367));
        assert_eq!(rows[1].runways, None);

        let properties = rows[1].properties();
        assert_eq!(properties.get("runways"), Some(&Value::Null));
        assert_eq!(properties.get("icao"), Some(&Value::Null));
        assert_eq!(properties.get("description"), Some(&json!("Unknown field")));
    }

    #[test]
    fn empty_text_cells_are_not_stored() {
        let csv_path = temp_path("sparse_nodes", "csv");
        let (graph, db_path) = open_temp("sparse");
        let _files = TempFiles(vec![csv_path.clone(), db_path]);
        std::fs::write(
            &csv_path,
            "id,iata,icao,city,descr,region,runways,longest,altitude,country,continent,lat,lon\n\
             1,XXX,,,Some Field,,2,,,ZZ,AN,,\n",
        )
        .expect("write csv");
        let rows: Vec<AirportRow> = read_rows(&csv_path).expect("parse failed");

        graph
            .write_blocking(|session| replace_with_rows(session, &rows, &[]))
            .expect("import failed");
        let airports = graph
            .read_blocking(|session| Ok(session.nodes(Some(AIRPORT))?))
            .expect("read failed");
        assert!(airports[0].property("icao").is_none());
        assert!(airports[0].property("city").is_none());
        assert!(airports[0].property("region").is_none());
        assert_eq!(airports[0].property("country"), Some(&json!("ZZ")));

        let lines = graph
            .read_blocking(describe_contents)
            .expect("read failed")
            .expect("not empty");
        assert_eq!(lines[1], " - XXX (unknown): Some Field with 2 runways");

        let (nodes, _) = graph.read_blocking(graph_data).expect("read failed");
        assert_eq!(nodes[0].city, Value::Null);
        assert_eq!(nodes[0].altitude, Value::Null);
    }

    #[test]
    fn malformed_numeric_cell_is_an_error() {
        let path = temp_path("bad_edges", "csv");
        let _files = TempFiles(vec![path.clone()]);
        std::fs::write(&path, "src,dest,dist\nATL,ANC,far\n").expect("write csv");
        let error = read_rows::<FlightRow>(&path).expect_err("should fail");
        assert!(matches!(error, GraphError::Source { .. }));
    }

    #[test]
    fn missing_file_is_an_error() {
        let error = read_rows::<FlightRow>(&temp_path("absent", "csv")).expect_err("should fail");
        assert!(error.to_string().contains("absent"));
    }

    #[test]
    fn replace_drops_flights_with_unknown_airports() {
        let (graph, path) = open_temp("replace");
        let _files = TempFiles(vec![path]);
        let counts = graph
            .write_blocking(|session| {
                replace_with_rows(
                    session,
                    &[airport(1, "ATL", 5), airport(2, "ANC", 4)],
                    &[
                        flight("ATL", "ANC", 3417),
                        flight("ATL", "ZZZ", 10),
                        flight("ANC", "ATL", 3417),
                    ],
                )
            })
            .expect("import failed");
        assert_eq!(
            counts,
            ImportCounts {
                airports: 2,
                flights: 2,
                unmatched_rows: 1
            }
        );

        let (nodes, edges) = graph.read_blocking(graph_data).expect("read failed");
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].source, json!("ATL"));
        assert_eq!(edges[0].target, json!("ANC"));
        assert_eq!(edges[0].distance, json!(3417));
        assert_eq!(nodes[0].lat, json!(33.5));
    }

    #[test]
    fn replace_discards_previous_graph() {
        let (graph, path) = open_temp("replace_twice");
        let _files = TempFiles(vec![path]);
        for code in ["OLD", "NEW"] {
            graph
                .write_blocking(|session| replace_with_rows(session, &[airport(1, code, 1)], &[]))
                .expect("import failed");
        }
        let lines = graph
            .read_blocking(describe_contents)
            .expect("read failed")
            .expect("not empty");
        assert_eq!(
            lines,
            [
                "Airports in the database:",
                " - NEW (NEW City): NEW International with 1 runways",
                " ",
                "Flight connections:",
            ]
        );
    }

    #[test]
    fn describe_contents_is_none_for_empty_graph() {
        let (graph, path) = open_temp("empty");
        let _files = TempFiles(vec![path]);
        assert_eq!(graph.read_blocking(describe_contents).expect("read failed"), None);
    }

    #[test]
    fn describe_contents_lists_flights_after_airports() {
        let (graph, path) = open_temp("describe");
        let _files = TempFiles(vec![path]);
        graph
            .write_blocking(|session| {
                replace_with_rows(
                    session,
                    &[airport(1, "ATL", 5), airport(2, "AUS", 2)],
                    &[flight("ATL", "AUS", 811)],
                )
            })
            .expect("import failed");
        let lines = graph
            .read_blocking(describe_contents)
            .expect("read failed")
            .expect("not empty");
        assert_eq!(lines[1], " - ATL (ATL City): ATL International with 5 runways");
        assert_eq!(lines.last().map(String::as_str), Some(" - ATL -> AUS (811 miles)"));
    }

    #[test]
    fn runway_filter_matches_exact_count_only() {
        let (graph, path) = open_temp("runways");
        let _files = TempFiles(vec![path]);
        graph
            .write_blocking(|session| {
                replace_with_rows(
                    session,
                    &[airport(1, "SIX", 6), airport(2, "SVN", 7), airport(3, "EGT", 8)],
                    &[],
                )
            })
            .expect("import failed");
        let seven = graph
            .read_blocking(|session| airports_with_runways(session, 7))
            .expect("read failed");
        assert_eq!(seven, ["SVN"]);
        let none = graph
            .read_blocking(|session| airports_with_runways(session, 9))
            .expect("read failed");
        assert!(none.is_empty());
    }
}
