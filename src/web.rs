/// Web front door: form-based predictions over HTTP.
///
/// Two form variants, selected in configuration:
///
/// - `features`: `POST /predict` with `feature1`, `feature2`, `feature3`.
///   Responds `{"prediction": <level>}`, or `{"error": "<message>"}` for any
///   failure (bad field, model rejection). Always HTTP 200.
/// - `site`: `POST /predict` with `date`, `month`, `year`, `flow`,
///   `rainfall`. Responds with an HTML page showing the predicted level;
///   malformed fields get a plain-text 400.
///
/// Other endpoints:
/// - GET / - the variant's input form
/// - GET /health - service health check
///
/// Requests are independent of each other and of the poll loop; the only
/// shared state is the read-only model.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use threadpool::ThreadPool;

use crate::config::{FormVariant, WebConfig};
use crate::logging::{self, Component};
use crate::model::FloodError;
use crate::oracle::Predictor;

const FEATURE_FIELDS: [&str; 3] = ["feature1", "feature2", "feature3"];
const SITE_FIELDS: [&str; 5] = ["date", "month", "year", "flow", "rainfall"];

// ---------------------------------------------------------------------------
// Input scaling
// ---------------------------------------------------------------------------

/// Transforms raw form values into model input.
pub trait Scaler: Send + Sync {
    fn scale(&self, input: Vec<f64>) -> Result<Vec<f64>, FloodError>;
}

/// Passes values through unchanged.
pub struct IdentityScaler;

impl Scaler for IdentityScaler {
    fn scale(&self, input: Vec<f64>) -> Result<Vec<f64>, FloodError> {
        Ok(input)
    }
}

/// `(x - mean) / scale`, per column.
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self { mean, scale }
    }
}

impl Scaler for StandardScaler {
    fn scale(&self, input: Vec<f64>) -> Result<Vec<f64>, FloodError> {
        if input.len() != self.mean.len() {
            return Err(FloodError::Model(format!(
                "scaler expects {} features, got {}",
                self.mean.len(),
                input.len()
            )));
        }
        Ok(input
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Form parsing
// ---------------------------------------------------------------------------

/// Decodes an `application/x-www-form-urlencoded` body.
///
/// Pairs that fail to decode are dropped; a repeated name keeps the first value.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = urlencoding::decode(&name.replace('+', " ")).map(|s| s.into_owned());
        let value = urlencoding::decode(&value.replace('+', " ")).map(|s| s.into_owned());
        if let (Ok(name), Ok(value)) = (name, value) {
            fields.entry(name).or_insert(value);
        }
    }
    fields
}

/// Reads a numeric form field.
pub fn form_number(form: &HashMap<String, String>, name: &str) -> Result<f64, FloodError> {
    let raw = form
        .get(name)
        .ok_or_else(|| FloodError::Parse(format!("missing form field '{}'", name)))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| FloodError::Parse(format!("could not convert '{}' to a number for field '{}'", raw, name)))
}

fn form_numbers(form: &HashMap<String, String>, names: &[&str]) -> Result<Vec<f64>, FloodError> {
    names.iter().map(|name| form_number(form, name)).collect()
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// A rendered response, independent of the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    fn html(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn text(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body,
        }
    }

    /// Parses the body as JSON; for tests and clients of [`FrontDoor::handle`].
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    fn into_response(self) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
        let response = tiny_http::Response::from_string(self.body)
            .with_status_code(tiny_http::StatusCode::from(self.status));
        match tiny_http::Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes()) {
            Ok(header) => response.with_header(header),
            Err(_) => response,
        }
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

fn form_page(variant: FormVariant) -> String {
    let names: &[&str] = match variant {
        FormVariant::Features => &FEATURE_FIELDS,
        FormVariant::Site => &SITE_FIELDS,
    };
    let inputs: String = names
        .iter()
        .map(|name| {
            format!(
                "    <label>{name} <input type=\"text\" name=\"{name}\" required></label><br>\n",
                name = name
            )
        })
        .collect();

    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Flood Prediction</title></head>\n<body>\n\
         <h1>Flood Prediction</h1>\n\
         <form action=\"/predict\" method=\"post\">\n{}    <button type=\"submit\">Predict</button>\n\
         </form>\n</body>\n</html>\n",
        inputs
    )
}

fn results_page(level: f64) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Flood Prediction Result</title></head>\n<body>\n\
         <h1>Predicted water level</h1>\n<p class=\"prediction\">{}</p>\n\
         <a href=\"/\">Back</a>\n</body>\n</html>\n",
        level
    )
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

/// NaN or infinity has no JSON number form, so it is reported as a model failure.
fn finite_level(level: f64) -> Result<f64, FloodError> {
    if level.is_finite() {
        Ok(level)
    } else {
        Err(FloodError::Model(format!("model produced a non-finite level ({})", level)))
    }
}

/// Routes requests for one form variant to the shared model.
pub struct FrontDoor {
    variant: FormVariant,
    oracle: Arc<dyn Predictor>,
    scaler: Box<dyn Scaler>,
}

impl FrontDoor {
    pub fn new(variant: FormVariant, oracle: Arc<dyn Predictor>) -> Self {
        Self {
            variant,
            oracle,
            scaler: Box::new(IdentityScaler),
        }
    }

    /// Replaces the identity scaling step of the features form.
    pub fn with_scaler(mut self, scaler: Box<dyn Scaler>) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn from_config(config: &WebConfig, oracle: Arc<dyn Predictor>) -> Self {
        let door = Self::new(config.variant, oracle);
        match (&config.scaler_mean, &config.scaler_scale) {
            (Some(mean), Some(scale)) => {
                door.with_scaler(Box::new(StandardScaler::new(mean.clone(), scale.clone())))
            }
            _ => door,
        }
    }

    pub fn variant(&self) -> FormVariant {
        self.variant
    }

    /// Produces the reply for one request.
    pub fn handle(&self, method: &tiny_http::Method, url: &str, body: &str) -> Reply {
        let path = url.split('?').next().unwrap_or(url);

        match (method, path) {
            (tiny_http::Method::Get, "/") => Reply::html(200, form_page(self.variant)),
            (tiny_http::Method::Get, "/health") => Reply::json(
                200,
                json!({
                    "status": "ok",
                    "service": "floodcast",
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            ),
            (tiny_http::Method::Post, "/predict") => match self.variant {
                FormVariant::Features => self.predict_features(body),
                FormVariant::Site => self.predict_site(body),
            },
            (_, "/predict") => Reply::json(405, json!({ "error": "Method not allowed" })),
            _ => Reply::json(
                404,
                json!({
                    "error": "Not found",
                    "available_endpoints": ["/", "/predict", "/health"]
                }),
            ),
        }
    }

    /// Three-feature form: every failure becomes a JSON error body.
    pub fn predict_features(&self, body: &str) -> Reply {
        let form = parse_form(body);
        let outcome = form_numbers(&form, &FEATURE_FIELDS)
            .and_then(|input| self.scaler.scale(input))
            .and_then(|scaled| self.oracle.predict(&scaled))
            .and_then(finite_level);

        match outcome {
            Ok(level) => Reply::json(200, json!({ "prediction": level })),
            Err(e) => {
                logging::warn(Component::Web, &format!("Prediction request failed: {}", e));
                Reply::json(200, json!({ "error": e.to_string() }))
            }
        }
    }

    /// Five-field form: renders the result page, no structured errors.
    pub fn predict_site(&self, body: &str) -> Reply {
        let form = parse_form(body);
        let features = match form_numbers(&form, &SITE_FIELDS) {
            Ok(features) => features,
            Err(e) => return Reply::text(400, format!("Bad Request: {}\n", e)),
        };

        match self.oracle.predict(&features).and_then(finite_level) {
            Ok(level) => Reply::html(200, results_page(level)),
            Err(e) => {
                logging::log_failure(Component::Web, "Site prediction", &e);
                Reply::text(500, "Internal Server Error\n".to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

fn handle_request(door: &FrontDoor, mut request: tiny_http::Request) {
    let mut bytes = Vec::new();
    let read = request.as_reader().read_to_end(&mut bytes);
    let reply = match read {
        // Invalid UTF-8 only spoils the fields it lands in.
        Ok(_) => door.handle(request.method(), request.url(), &String::from_utf8_lossy(&bytes)),
        Err(e) => Reply::text(400, format!("Bad Request: unreadable body: {}\n", e)),
    };

    logging::debug(
        Component::Web,
        &format!("{:?} {} -> {}", request.method(), request.url(), reply.status),
    );

    if let Err(e) = request.respond(reply.into_response()) {
        logging::warn(Component::Web, &format!("Failed to send response: {}", e));
    }
}

/// Serves requests from an already-bound server on a pool of `workers` threads.
pub fn serve(server: tiny_http::Server, door: Arc<FrontDoor>, workers: usize) {
    let pool = ThreadPool::new(workers.max(1));

    for request in server.incoming_requests() {
        let door = Arc::clone(&door);
        pool.execute(move || handle_request(&door, request));
    }
}

/// Binds `0.0.0.0:port` and serves the front door until the process exits.
pub fn start_front_door(port: u16, door: Arc<FrontDoor>, workers: usize) -> Result<(), FloodError> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| FloodError::Config(format!("Failed to start HTTP server on port {}: {}", port, e)))?;

    logging::info(
        Component::Web,
        &format!("Front door listening on http://0.0.0.0:{} ({:?} form)", port, door.variant()),
    );
    logging::info(Component::Web, "   GET  /        - input form");
    logging::info(Component::Web, "   POST /predict - run the model");
    logging::info(Component::Web, "   GET  /health  - service health check");

    serve(server, door, workers);
    Ok(())
}
