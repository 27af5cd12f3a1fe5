use std::future::Future;

use bytes::Bytes;
use serde::Deserialize;

use crate::config::ApiConfig;
use crate::models::Vehicle;

const VEHICLES_PATH: &str = "/api/action/busestrams_get/";

/// `type` parameter selecting buses (2 would be trams)
const VEHICLE_TYPE_BUS: u8 = 1;

/// Errors from a single vehicle poll
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure: DNS, connect, timeout, body read
    #[error("connection failed: {0}")]
    Network(String),

    #[error("API returned error status: {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Malformed(String),

    /// The API answered with a message instead of a vehicle list
    #[error("API rejected the request: {0}")]
    Rejected(String),
}

/// Coarse failure class used to pick the user notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Api,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Network(_) => FailureKind::Network,
            FetchError::Status(_) | FetchError::Malformed(_) | FetchError::Rejected(_) => {
                FailureKind::Api
            }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Optional filters passed through to the API
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleQuery {
    pub line: Option<String>,
    pub brigade: Option<String>,
}

impl VehicleQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn line(line: impl Into<String>) -> Self {
        Self {
            line: Some(line.into()),
            brigade: None,
        }
    }
}

/// Anything that can produce the current vehicle positions
pub trait VehicleSource: Send + Sync + 'static {
    fn fetch(
        &self,
        query: &VehicleQuery,
    ) -> impl Future<Output = Result<Vec<Vehicle>, FetchError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    result: Option<ResultField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultField {
    Vehicles(Vec<Vehicle>),
    Message(String),
}

/// Decode a `busestrams_get` response body.
///
/// A missing or `null` result is an empty poll, not an error.
pub fn parse_response(data: &[u8]) -> Result<Vec<Vehicle>, FetchError> {
    let response: ApiResponse =
        serde_json::from_slice(data).map_err(|e| FetchError::Malformed(e.to_string()))?;

    match response.result {
        Some(ResultField::Vehicles(vehicles)) => Ok(vehicles),
        Some(ResultField::Message(message)) => Err(FetchError::Rejected(message)),
        None => Ok(Vec::new()),
    }
}

/// HTTP client for the Warsaw open-data vehicle positions endpoint
pub struct WarsawClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl WarsawClient {
    pub fn new(config: ApiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.config.base_url, VEHICLES_PATH)
    }

    fn query_pairs(&self, query: &VehicleQuery) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("resource_id", self.config.resource_id.clone()),
            ("apikey", self.config.api_key.clone()),
            ("type", VEHICLE_TYPE_BUS.to_string()),
        ];
        if let Some(line) = &query.line {
            pairs.push(("line", line.clone()));
        }
        if let Some(brigade) = &query.brigade {
            pairs.push(("brigade", brigade.clone()));
        }
        pairs
    }

    /// Fetch the raw response body
    pub async fn fetch_raw(&self, query: &VehicleQuery) -> Result<Bytes, FetchError> {
        let url = self.endpoint();
        tracing::debug!(url = %url, line = ?query.line, brigade = ?query.brigade, "Fetching vehicle positions");

        let response = self
            .client
            .get(&url)
            .query(&self.query_pairs(query))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await?;

        tracing::debug!(bytes = bytes.len(), "Received data from API");
        Ok(bytes)
    }

    /// Poll the API and return all reported vehicles
    pub async fn poll_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>, FetchError> {
        let data = self.fetch_raw(query).await?;
        let vehicles = parse_response(&data)?;

        tracing::info!(count = vehicles.len(), "Parsed vehicle positions");
        Ok(vehicles)
    }
}

impl VehicleSource for WarsawClient {
    fn fetch(
        &self,
        query: &VehicleQuery,
    ) -> impl Future<Output = Result<Vec<Vehicle>, FetchError>> + Send {
        self.poll_vehicles(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, answer with `response` and return the request line
    async fn serve_once(response: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        (base_url, server)
    }

    fn client_for(base_url: String) -> WarsawClient {
        let mut config = ApiConfig::new("k");
        config.base_url = base_url;
        config.resource_id = "res".to_string();
        WarsawClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_error_status_is_api_failure() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let client = client_for(base_url);

        let err = client
            .poll_vehicles(&VehicleQuery {
                line: Some("523".to_string()),
                brigade: Some("4".to_string()),
            })
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Status(500));
        assert_eq!(err.kind(), FailureKind::Api);
        assert_eq!(
            server.await.unwrap(),
            "GET /api/action/busestrams_get/?resource_id=res&apikey=k&type=1&line=523&brigade=4 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_success_body_is_decoded() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\nConnection: close\r\n\r\n\
             {\"result\":[{\"Lines\":\"523\",\"Lon\":21.01,\"Lat\":52.23,\"Time\":\"t\",\"VehicleNumber\":\"1000\",\"Brigade\":\"1\"}]}",
        )
        .await;
        let client = client_for(base_url);

        let vehicles = client.poll_vehicles(&VehicleQuery::all()).await.unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].vehicle_id, "1000");
        assert_eq!(
            server.await.unwrap(),
            "GET /api/action/busestrams_get/?resource_id=res&apikey=k&type=1 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{}", addr));
        let err = client.poll_vehicles(&VehicleQuery::all()).await.unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
        assert_eq!(err.kind(), FailureKind::Network);
    }

    #[test]
    fn test_parse_vehicle_list() {
        let body = br#"{"result": [
            {"Lines": "523", "Lon": 21.01, "Lat": 52.23, "Time": "2024-12-16 10:00:00", "VehicleNumber": "1000", "Brigade": "1"},
            {"Lines": "N61", "Lon": 21.02, "Lat": 52.24, "Time": "2024-12-16 10:00:05", "VehicleNumber": "1001", "Brigade": "2"}
        ]}"#;

        let vehicles = parse_response(body).unwrap();
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].line, "523");
        assert_eq!(vehicles[1].vehicle_id, "1001");
    }

    #[test]
    fn test_parse_empty_null_and_missing_result() {
        assert!(parse_response(br#"{"result": []}"#).unwrap().is_empty());
        assert!(parse_response(br#"{"result": null}"#).unwrap().is_empty());
        assert!(parse_response(br#"{}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_error_message_result() {
        let err = parse_response(br#"{"result": "Bledna metoda lub parametry wywolania"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::Rejected("Bledna metoda lub parametry wywolania".to_string())
        );
        assert_eq!(err.kind(), FailureKind::Api);
    }

    #[test]
    fn test_parse_garbage_is_api_failure() {
        let err = parse_response(b"<html>502</html>").unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert_eq!(err.kind(), FailureKind::Api);
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(FetchError::Network("reset".into()).kind(), FailureKind::Network);
        assert_eq!(FetchError::Status(503).kind(), FailureKind::Api);
    }

    #[test]
    fn test_query_pairs() {
        let mut config = ApiConfig::new("key");
        config.resource_id = "res".to_string();
        let client = WarsawClient::new(config).unwrap();

        let pairs = client.query_pairs(&VehicleQuery::all());
        assert_eq!(
            pairs,
            vec![
                ("resource_id", "res".to_string()),
                ("apikey", "key".to_string()),
                ("type", "1".to_string()),
            ]
        );

        let pairs = client.query_pairs(&VehicleQuery {
            line: Some("523".to_string()),
            brigade: Some("4".to_string()),
        });
        assert_eq!(pairs[3], ("line", "523".to_string()));
        assert_eq!(pairs[4], ("brigade", "4".to_string()));
        assert_eq!(
            client.endpoint(),
            "https://api.um.warszawa.pl/api/action/busestrams_get/"
        );
    }
}
