use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::airports::{
    self, AirportRow, EDGES_FILE, FlightRow, GraphEdge, GraphNode, NODES_FILE,
    airports_with_runways, describe_contents, read_rows, replace_with_rows,
};
use crate::config::Config;
use crate::error::GraphError;
use crate::search::{Neighbourhood, find_neighbourhood};
use crate::store::GraphDb;

const ROOT_PAGE: &str = r#"<html>
    <head>
        <title>Airgraph API</title>
    </head>
    <body>
        <h1>Airgraph API</h1>
    </body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
    graph: GraphDb,
    import_dir: Arc<PathBuf>,
    response_delay: Duration,
}

impl AppState {
    pub fn new(graph: GraphDb, config: &Config) -> Self {
        AppState {
            graph,
            import_dir: Arc::new(config.import_dir.clone()),
            response_delay: config.response_delay,
        }
    }
}

#[derive(Serialize)]
struct Success {
    success: bool,
}

#[derive(Serialize)]
struct Failure {
    success: bool,
    error: &'static str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ReadExampleResponse {
    Content {
        success: bool,
        #[serde(rename = "db-content")]
        db_content: Vec<String>,
    },
    Empty {
        success: bool,
        #[serde(rename = "error-message")]
        error_message: &'static str,
    },
}

#[derive(Serialize)]
struct WriteExampleResponse {
    success: bool,
    message: &'static str,
}

#[derive(Serialize)]
struct GraphDataResponse {
    success: bool,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

#[derive(Serialize)]
struct AirportsResponse {
    success: bool,
    airports: Vec<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    success: bool,
    data: Neighbourhood,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/clear-db", get(clear_db))
        .route("/read-db-example", get(read_db_example))
        .route("/write-db-example", get(write_db_example))
        .route("/graph-data", get(graph_data))
        .route("/seven-runways", get(seven_runways))
        .route("/airports/runways/{count}", get(airports_by_runways))
        .route("/search-node/{term}", get(search_node))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Html<&'static str> {
    Html(ROOT_PAGE)
}

// Debugging aid: wipes every node and edge without confirmation.
async fn clear_db(State(state): State<AppState>) -> Result<Json<Success>, (StatusCode, String)> {
    state
        .graph
        .write(|session| Ok(session.clear()?))
        .await
        .map_err(db_error)?;
    tracing::info!("database cleared");

    Ok(Json(Success { success: true }))
}

async fn read_db_example(
    State(state): State<AppState>,
) -> Result<Json<ReadExampleResponse>, (StatusCode, String)> {
    let contents = state
        .graph
        .read(describe_contents)
        .await
        .map_err(db_error)?;
    let Some(db_content) = contents else {
        return Ok(Json(ReadExampleResponse::Empty {
            success: false,
            error_message: "The database is empty!",
        }));
    };

    tokio::time::sleep(state.response_delay).await;
    Ok(Json(ReadExampleResponse::Content {
        success: true,
        db_content,
    }))
}

async fn write_db_example(
    State(state): State<AppState>,
) -> Result<Json<WriteExampleResponse>, (StatusCode, String)> {
    let import_dir = state.import_dir.clone();
    let counts = state
        .graph
        .write(move |session| {
            let airports: Vec<AirportRow> = read_rows(&import_dir.join(NODES_FILE))?;
            let flights: Vec<FlightRow> = read_rows(&import_dir.join(EDGES_FILE))?;
            replace_with_rows(session, &airports, &flights)
        })
        .await
        .map_err(db_error)?;
    tracing::info!(
        airports = counts.airports,
        flights = counts.flights,
        unmatched_rows = counts.unmatched_rows,
        "airport data imported"
    );

    tokio::time::sleep(state.response_delay).await;
    Ok(Json(WriteExampleResponse {
        success: true,
        message: "Airport data imported from CSV files.",
    }))
}

async fn graph_data(State(state): State<AppState>) -> Result<Response, (StatusCode, String)> {
    let (nodes, edges) = state
        .graph
        .read(airports::graph_data)
        .await
        .map_err(db_error)?;
    if nodes.is_empty() && edges.is_empty() {
        return Ok(not_found("No data found"));
    }

    Ok(Json(GraphDataResponse {
        success: true,
        nodes,
        edges,
    })
    .into_response())
}

async fn seven_runways(
    State(state): State<AppState>,
) -> Result<Json<AirportsResponse>, (StatusCode, String)> {
    runway_filter(&state, 7).await
}

async fn airports_by_runways(
    State(state): State<AppState>,
    Path(count): Path<i64>,
) -> Result<Json<AirportsResponse>, (StatusCode, String)> {
    runway_filter(&state, count).await
}

async fn runway_filter(
    state: &AppState,
    count: i64,
) -> Result<Json<AirportsResponse>, (StatusCode, String)> {
    let airports = state
        .graph
        .read(move |session| airports_with_runways(session, count))
        .await
        .map_err(db_error)?;

    Ok(Json(AirportsResponse {
        success: true,
        airports,
    }))
}

async fn search_node(
    State(state): State<AppState>,
    Path(term): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let found = state
        .graph
        .read(move |session| find_neighbourhood(session, &term))
        .await
        .map_err(db_error)?;
    let Some(data) = found else {
        return Ok(not_found("Node not found"));
    };

    Ok(Json(SearchResponse {
        success: true,
        data,
    })
    .into_response())
}

fn not_found(error: &'static str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Failure {
            success: false,
            error,
        }),
    )
        .into_response()
}

fn db_error(error: GraphError) -> (StatusCode, String) {
    tracing::error!(%error, "graph request failed");
    let status = match &error {
        GraphError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}
