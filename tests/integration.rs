// tests/integration.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

use loopback_transport::{
    //
    LoopbackConfig,
    LoopbackTransport,
    Transport,
};

type MethodFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Minimal JSON-RPC engine driving one side of the pair.
///
/// Registers itself in the transport's handler slots, answers requests with
/// registered methods and resolves its own outstanding requests by id.
#[derive(Clone)]
struct Engine {
    transport: LoopbackTransport,
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>,
    methods: Arc<Mutex<HashMap<String, MethodFn>>>,
}

impl Engine {
    // ---
    async fn attach(transport: LoopbackTransport) -> Self {
        // ---
        let engine = Self {
            transport: transport.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            methods: Arc::new(Mutex::new(HashMap::new())),
        };

        let dispatcher = engine.clone();
        transport.on_message(move |msg| dispatcher.dispatch(msg));
        transport.start().await.expect("engine failed to start transport");

        engine
    }

    fn register<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.methods
            .lock()
            .unwrap()
            .insert(method.to_string(), Arc::new(handler));
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, String> {
        // ---
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        self.transport
            .send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await
            .map_err(|e| e.to_string())?;

        timeout(Duration::from_secs(1), rx)
            .await
            .map_err(|_| "request timed out".to_string())?
            .map_err(|_| "engine dropped request".to_string())?
    }

    fn dispatch(&self, msg: Value) {
        // ---
        let id = msg.get("id").and_then(Value::as_u64);

        if let Some(method) = msg.get("method").and_then(Value::as_str) {
            let Some(id) = id else {
                return; // notification
            };
            let handler = self.methods.lock().unwrap().get(method).cloned();
            let reply = match handler {
                Some(handler) => match handler(msg["params"].clone()) {
                    Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    Err(message) => error_reply(id, -32603, &message),
                },
                None => error_reply(id, -32601, "method not found"),
            };

            // Handlers are synchronous; reply from a task.
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let _ = transport.send(reply).await;
            });
            return;
        }

        let Some(id) = id else {
            return;
        };
        let Some(tx) = self.pending.lock().unwrap().remove(&id) else {
            return;
        };
        let outcome = match msg.get("error") {
            Some(err) => Err(err["message"].as_str().unwrap_or("error").to_string()),
            None => Ok(msg["result"].clone()),
        };
        let _ = tx.send(outcome);
    }
}

fn error_reply(id: u64, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

#[derive(Debug, Serialize, Deserialize)]
struct WeatherParams {
    city: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct WeatherResult {
    temperature: i32,
    conditions: String,
}

async fn setup(stringify: bool) -> (Engine, Engine) {
    // ---
    let client_transport = LoopbackTransport::new(
        LoopbackConfig::client()
            .with_debug(true)
            .with_stringify_messages(stringify),
    );
    let server_transport = LoopbackTransport::new(LoopbackConfig::server());
    client_transport.connect(&server_transport).unwrap();

    let server = Engine::attach(server_transport).await;
    let client = Engine::attach(client_transport).await;
    (client, server)
}

fn weather(params: Value) -> Result<Value, String> {
    let params: WeatherParams = serde_json::from_value(params).map_err(|e| e.to_string())?;
    let result = WeatherResult {
        temperature: 20,
        conditions: format!("Weather for {}", params.city),
    };
    serde_json::to_value(result).map_err(|e| e.to_string())
}

#[tokio::test]
async fn client_request_gets_server_response() {
    // ---
    let (client, server) = setup(false).await;
    server.register("weather/get", |_| {
        Ok(json!({"temperature": 72, "conditions": "sunny"}))
    });

    let response = client
        .request("weather/get", json!({"city": "New York"}))
        .await
        .expect("request failed");

    let result: WeatherResult = serde_json::from_value(response).unwrap();
    assert_eq!(
        result,
        WeatherResult {
            temperature: 72,
            conditions: "sunny".into()
        }
    );
}

#[tokio::test]
async fn server_error_surfaces_to_client() {
    // ---
    let (client, server) = setup(false).await;
    server.register("weather/get", |_| Err("Unexpected server error".into()));

    let result = client
        .request("weather/get", json!({"city": "Invalid City"}))
        .await;

    assert_eq!(result, Err("Unexpected server error".to_string()));
}

#[tokio::test]
async fn unknown_method_is_rejected() {
    // ---
    let (client, _server) = setup(false).await;

    let result = client.request("weather/forecast", json!({})).await;

    assert_eq!(result, Err("method not found".to_string()));
}

#[tokio::test]
async fn concurrent_requests_are_correlated() {
    // ---
    let (client, server) = setup(true).await;
    server.register("weather/get", weather);

    let cities = ["New York", "London", "Tokyo"];
    let responses = request_all(&client, &cities).await;

    for (city, response) in cities.iter().zip(responses) {
        let result: WeatherResult = serde_json::from_value(response.unwrap()).unwrap();
        assert_eq!(result.temperature, 20);
        assert_eq!(result.conditions, format!("Weather for {city}"));
    }
}

async fn request_all(client: &Engine, cities: &[&str]) -> Vec<Result<Value, String>> {
    // ---
    let handles: Vec<_> = cities
        .iter()
        .map(|city| {
            let client = client.clone();
            let params = json!({ "city": city });
            tokio::spawn(async move { client.request("weather/get", params).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("request task panicked"));
    }
    results
}

#[tokio::test]
async fn both_directions_carry_requests() {
    // ---
    let (client, server) = setup(false).await;
    server.register("weather/get", weather);
    client.register("sampling/create", |params| Ok(json!({"echo": params})));

    let forward = client.request("weather/get", json!({"city": "Oslo"})).await;
    let reverse = server.request("sampling/create", json!("hi")).await;

    assert_eq!(forward.unwrap()["conditions"], "Weather for Oslo");
    assert_eq!(reverse.unwrap(), json!({"echo": "hi"}));
}

#[tokio::test]
async fn request_after_close_fails_fast() {
    // ---
    let (client, server) = setup(false).await;
    server.register("weather/get", weather);

    server.transport.close().await.unwrap();

    let result = client.request("weather/get", json!({"city": "Paris"})).await;
    assert_eq!(
        result,
        Err("peer transport has no onmessage handler set".to_string())
    );
}
