//! JSON-lines host bridge.
//!
//! Each input line is one call:
//!
//! ```json
//! {"callId": 7, "method": "buildConcat", "params": {"videoUris": ["a.mp4"], "resultName": "out.mp4"}}
//! ```
//!
//! and yields exactly one response line echoing the `callId`, carrying
//! either `result` or `error`. Open streams additionally emit `event` lines
//! tagged with their `subscriptionId` until closed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vproc_models::{OutputTarget, Request, RequestId, RequestView, StatusFilter};
use vproc_store::{RequestEvent, Subscription, SubscriptionCloser};

use crate::builder::{ConcatBuilder, EncodeBuilder, JobBuilder, MergeBuilder};
use crate::error::{ServiceError, ServiceResult};
use crate::service::{parse_position, VideoService};

/// Buffered output lines before writers wait.
pub const OUTPUT_BUFFER_SIZE: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Call {
    #[serde(default)]
    call_id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

struct OpenStream {
    task: JoinHandle<()>,
    closer: SubscriptionCloser,
}

type Streams = HashMap<u64, OpenStream>;

/// A subscription whose forwarder starts once the caller has its id.
enum PendingStream {
    Request(Subscription<RequestEvent>),
    Collection(Subscription<Vec<Request>>),
}

impl PendingStream {
    fn subscription_id(&self) -> u64 {
        match self {
            PendingStream::Request(sub) => sub.id().as_u64(),
            PendingStream::Collection(sub) => sub.id().as_u64(),
        }
    }
}

enum Reply {
    Value(Value),
    Stream(PendingStream),
}

/// Dispatches bridge calls to a [`VideoService`].
#[derive(Clone)]
pub struct Bridge {
    service: Arc<VideoService>,
    out: mpsc::Sender<Value>,
    streams: Arc<Mutex<Streams>>,
}

impl Bridge {
    pub fn new(service: Arc<VideoService>, out: mpsc::Sender<Value>) -> Self {
        Self {
            service,
            out,
            streams: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn streams(&self) -> MutexGuard<'_, Streams> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one input line and emit its response.
    pub async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let call: Call = match serde_json::from_str(line) {
            Ok(call) => call,
            Err(e) => {
                warn!("Malformed bridge call: {}", e);
                let err = ServiceError::invalid_request(format!("malformed call: {}", e));
                self.emit(error_response(&Value::Null, &err)).await;
                return;
            }
        };

        debug!(method = %call.method, call_id = %call.call_id, "Bridge call");

        match self.call(&call.method, &call.params).await {
            Ok(Reply::Value(result)) => {
                self.emit(json!({ "callId": call.call_id, "result": result })).await;
            }
            Ok(Reply::Stream(pending)) => {
                // The id goes out before any stream event can
                let result = json!({ "subscriptionId": pending.subscription_id() });
                self.emit(json!({ "callId": call.call_id, "result": result })).await;
                self.start_stream(pending);
            }
            Err(err) => {
                warn!(method = %call.method, kind = err.kind(), "Bridge call failed: {}", err);
                self.emit(error_response(&call.call_id, &err)).await;
            }
        }
    }

    /// Run one method and return its result payload. Streams start
    /// forwarding immediately.
    pub async fn dispatch(&self, method: &str, params: &Value) -> ServiceResult<Value> {
        match self.call(method, params).await? {
            Reply::Value(value) => Ok(value),
            Reply::Stream(pending) => Ok(self.start_stream(pending)),
        }
    }

    async fn call(&self, method: &str, params: &Value) -> ServiceResult<Reply> {
        let service = &self.service;
        let pending = match method {
            "streamById" => PendingStream::Request(service.stream_by_id(&request_id(params)?)?),
            "streamAll" => PendingStream::Collection(service.stream_all(status_filter(params))),
            _ => return self.call_value(method, params).await.map(Reply::Value),
        };
        Ok(Reply::Stream(pending))
    }

    async fn call_value(&self, method: &str, params: &Value) -> ServiceResult<Value> {
        let service = &self.service;

        match method {
            "buildConcat" => {
                let builder = ConcatBuilder::new(file_list(params, "videoUris")?, output_target(params)?);
                self.build(builder).await
            }
            "buildMerge" => {
                let builder = MergeBuilder::new(file_list(params, "videoUris")?, output_target(params)?)
                    .with_payload(config_param(params))?;
                self.build(builder).await
            }
            "buildEncode" => {
                let inputs = match params.get("videoUri") {
                    Some(_) => vec![path_param(params, "videoUri")?],
                    None => file_list(params, "videoUris")?,
                };
                let builder = EncodeBuilder::from_inputs(inputs, output_target(params)?)
                    .with_payload(config_param(params))?;
                self.build(builder).await
            }
            "process" => view(service.process(&request_id(params)?).await?),
            "cancel" => view(service.cancel(&request_id(params)?).await?),
            "delete" => view(service.delete(&request_id(params)?).await?),
            "getById" => view(service.get_by_id(&request_id(params)?).await?),
            "listAll" => {
                let requests = service.list_all(status_filter(params)).await;
                to_json(&views(&requests))
            }
            "closeStream" => {
                let id = params
                    .get("subscriptionId")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ServiceError::invalid_request("subscriptionId is required"))?;
                Ok(json!(self.close_stream(id).await))
            }
            "getInfo" => to_json(&service.get_info(path_param(params, "videoPath")?).await?),
            "generateThumbnail" => {
                let position = parse_position(params.get("position").unwrap_or(&Value::Null))?;
                let written = service
                    .generate_thumbnail(
                        path_param(params, "videoPath")?,
                        output_target(params)?,
                        position,
                        dimension_param(params, "width")?,
                        dimension_param(params, "height")?,
                        params.get("precise").and_then(Value::as_bool),
                    )
                    .await?;
                Ok(json!(written.display().to_string()))
            }
            "cleanNoise" => {
                let written = service
                    .clean_noise(path_param(params, "videoPath")?, output_target(params)?)
                    .await?;
                Ok(json!(written.display().to_string()))
            }
            "compare" => Ok(json!(service.compare(file_list(params, "videoUris")?).await?)),
            "getResultPath" => {
                let name = string_param(params, "name")?;
                Ok(json!(service.result_path(&name)?.display().to_string()))
            }
            other => Err(ServiceError::invalid_request(format!("unknown method '{}'", other))),
        }
    }

    async fn build<B: JobBuilder>(&self, builder: B) -> ServiceResult<Value> {
        let request = if self.service.config().auto_process {
            self.service.build_and_process(builder).await?
        } else {
            self.service.build(builder).await?
        };
        view(request)
    }

    /// Register and start forwarding a stream, returning its id payload.
    fn start_stream(&self, pending: PendingStream) -> Value {
        let subscription_id = pending.subscription_id();
        let out = self.out.clone();
        let streams = self.streams.clone();

        // Registered under the lock so a stream ending at once still
        // finds its own entry to remove.
        let mut registry = self.streams();
        let (closer, task) = match pending {
            PendingStream::Request(mut subscription) => {
                let closer = subscription.closer();
                let task = tokio::spawn(async move {
                    while let Some(event) = subscription.recv().await {
                        let removed = event.is_removed();
                        let message = json!({
                            "event": "stream",
                            "subscriptionId": subscription_id,
                            "removed": removed,
                            "result": RequestView::from(event.request()),
                        });
                        if out.send(message).await.is_err() || removed {
                            break;
                        }
                    }
                    debug!(subscription_id, "Request stream ended");
                    lock(&streams).remove(&subscription_id);
                });
                (closer, task)
            }
            PendingStream::Collection(mut subscription) => {
                let closer = subscription.closer();
                let task = tokio::spawn(async move {
                    while let Some(requests) = subscription.recv().await {
                        let message = json!({
                            "event": "allStream",
                            "subscriptionId": subscription_id,
                            "result": views(&requests),
                        });
                        if out.send(message).await.is_err() {
                            break;
                        }
                    }
                    lock(&streams).remove(&subscription_id);
                });
                (closer, task)
            }
        };
        registry.insert(subscription_id, OpenStream { task, closer });

        json!({ "subscriptionId": subscription_id })
    }

    /// Stop a stream. Returns whether it was still open. Once this returns
    /// the stream emits nothing further.
    pub async fn close_stream(&self, subscription_id: u64) -> bool {
        let stream = self.streams().remove(&subscription_id);
        let Some(stream) = stream else {
            return false;
        };

        stream.closer.close();
        stream.task.abort();
        // Wait out a send already in progress
        let _ = stream.task.await;
        debug!(subscription_id, "Stream closed by caller");
        true
    }

    pub fn open_streams(&self) -> usize {
        self.streams().len()
    }

    /// Abort every open stream.
    pub fn shutdown(&self) {
        let streams: Vec<_> = self.streams().drain().collect();
        if !streams.is_empty() {
            info!(streams = streams.len(), "Closing open streams");
        }
        for (_, stream) in streams {
            stream.closer.close();
            stream.task.abort();
        }
    }

    async fn emit(&self, message: Value) {
        if self.out.send(message).await.is_err() {
            warn!("Bridge output closed, dropping response");
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("service", &self.service)
            .field("open_streams", &self.open_streams())
            .finish()
    }
}

fn lock(streams: &Mutex<Streams>) -> MutexGuard<'_, Streams> {
    streams.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error_response(call_id: &Value, err: &ServiceError) -> Value {
    json!({
        "callId": call_id,
        "error": { "kind": err.kind(), "message": err.to_string() },
    })
}

fn to_json<T: Serialize>(value: &T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(|e| ServiceError::engine(format!("unserializable result: {}", e)))
}

fn view(request: Request) -> ServiceResult<Value> {
    to_json(&RequestView::from(request))
}

fn views(requests: &[Request]) -> Vec<RequestView> {
    requests.iter().map(RequestView::from).collect()
}

fn string_param(params: &Value, key: &str) -> ServiceResult<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::invalid_request(format!("{} is required", key)))
}

fn path_param(params: &Value, key: &str) -> ServiceResult<PathBuf> {
    string_param(params, key).map(PathBuf::from)
}

/// Accepts `id` or its `path` alias.
fn request_id(params: &Value) -> ServiceResult<RequestId> {
    ["id", "path"]
        .iter()
        .find_map(|key| params.get(*key).and_then(Value::as_str))
        .map(RequestId::from)
        .ok_or_else(|| ServiceError::invalid_request("id is required"))
}

/// `resultPath` names a file directly, `resultName` goes through the
/// result directory.
fn output_target(params: &Value) -> ServiceResult<OutputTarget> {
    if let Some(path) = params.get("resultPath").and_then(Value::as_str) {
        return Ok(OutputTarget::Path(PathBuf::from(path)));
    }
    if let Some(name) = params.get("resultName").and_then(Value::as_str) {
        return Ok(OutputTarget::ResultName(name.to_string()));
    }
    Err(ServiceError::invalid_request("resultPath or resultName is required"))
}

fn config_param(params: &Value) -> &Value {
    params.get("config").unwrap_or(&Value::Null)
}

/// A file list given as an array, or as JSON text holding one.
fn file_list(params: &Value, key: &str) -> ServiceResult<Vec<PathBuf>> {
    let invalid = || ServiceError::invalid_request(format!("{} must be a list of file paths", key));

    let decoded;
    let items = match params.get(key) {
        Some(Value::Array(items)) => items,
        Some(Value::String(text)) => {
            decoded = serde_json::from_str::<Value>(text).map_err(|_| invalid())?;
            decoded.as_array().ok_or_else(invalid)?
        }
        Some(_) => return Err(invalid()),
        None => return Err(ServiceError::invalid_request(format!("{} is required", key))),
    };

    items
        .iter()
        .map(|item| item.as_str().map(PathBuf::from).ok_or_else(invalid))
        .collect()
}

fn dimension_param(params: &Value, key: &str) -> ServiceResult<Option<u32>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                ServiceError::invalid_request(format!("{} must be a non-negative integer", key))
            }),
    }
}

fn status_filter(params: &Value) -> StatusFilter {
    let raw = params.get("status").and_then(Value::as_str);
    let filter = StatusFilter::from_query(raw);
    if let (Some(raw), StatusFilter::All) = (raw, filter) {
        if !raw.eq_ignore_ascii_case("all") {
            debug!(status = raw, "Unrecognised status filter, selecting all requests");
        }
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use std::time::Duration;

    fn bridge() -> (tempfile::TempDir, Bridge, mpsc::Receiver<Value>) {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::default().with_result_dir(dir.path());
        let service = Arc::new(VideoService::from_config(config));
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER_SIZE);
        (dir, Bridge::new(service, tx), rx)
    }

    async fn next(rx: &mut mpsc::Receiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_file_list_forms() {
        let array = json!({ "videoUris": ["a.mp4", "b.mp4"] });
        let text = json!({ "videoUris": "[\"a.mp4\",\"b.mp4\"]" });
        let expected = vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")];

        assert_eq!(file_list(&array, "videoUris").unwrap(), expected);
        assert_eq!(file_list(&text, "videoUris").unwrap(), expected);
        assert!(file_list(&json!({ "videoUris": "a.mp4" }), "videoUris").is_err());
        assert!(file_list(&json!({ "videoUris": [1] }), "videoUris").is_err());
        assert!(file_list(&json!({}), "videoUris").is_err());
    }

    #[test]
    fn test_request_id_alias() {
        assert_eq!(request_id(&json!({ "id": "abc" })).unwrap().as_str(), "abc");
        assert_eq!(request_id(&json!({ "path": "abc" })).unwrap().as_str(), "abc");
        assert!(request_id(&json!({})).is_err());
    }

    #[test]
    fn test_output_target_forms() {
        assert_eq!(
            output_target(&json!({ "resultPath": "/tmp/out.mp4" })).unwrap(),
            OutputTarget::Path(PathBuf::from("/tmp/out.mp4"))
        );
        assert_eq!(
            output_target(&json!({ "resultName": "out.mp4" })).unwrap(),
            OutputTarget::ResultName("out.mp4".to_string())
        );
        assert!(output_target(&json!({})).is_err());
    }

    #[test]
    fn test_dimension_param() {
        assert_eq!(dimension_param(&json!({}), "width").unwrap(), None);
        assert_eq!(dimension_param(&json!({ "width": 320 }), "width").unwrap(), Some(320));
        assert!(dimension_param(&json!({ "width": -1 }), "width").is_err());
    }

    #[tokio::test]
    async fn test_build_and_get_round_trip() {
        let (_dir, bridge, mut rx) = bridge();

        bridge
            .handle_line(r#"{"callId":1,"method":"buildConcat","params":{"videoUris":["a.mp4","b.mp4"],"resultName":"out.mp4"}}"#)
            .await;
        let built = next(&mut rx).await;
        assert_eq!(built["callId"], 1);
        assert_eq!(built["result"]["status"], "idle");
        assert_eq!(built["result"]["type"], "concat");

        let id = built["result"]["id"].as_str().unwrap().to_string();
        let line = json!({ "callId": "two", "method": "getById", "params": { "path": id } });
        bridge.handle_line(&line.to_string()).await;
        let fetched = next(&mut rx).await;
        assert_eq!(fetched["callId"], "two");
        assert_eq!(fetched["result"]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_errors_carry_kind() {
        let (_dir, bridge, mut rx) = bridge();

        bridge.handle_line(r#"{"callId":3,"method":"getById","params":{"id":"missing"}}"#).await;
        let response = next(&mut rx).await;
        assert_eq!(response["callId"], 3);
        assert_eq!(response["error"]["kind"], "not_found");

        bridge.handle_line(r#"{"callId":4,"method":"nope"}"#).await;
        assert_eq!(next(&mut rx).await["error"]["kind"], "invalid_request");

        bridge.handle_line("not json").await;
        let response = next(&mut rx).await;
        assert!(response["callId"].is_null());
        assert_eq!(response["error"]["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_bad_config_is_config_parse() {
        let (_dir, bridge, mut rx) = bridge();

        let line = json!({
            "callId": 5,
            "method": "buildMerge",
            "params": { "videoUris": ["a.mp4"], "resultName": "m.mp4", "config": "{oops" }
        });
        bridge.handle_line(&line.to_string()).await;
        assert_eq!(next(&mut rx).await["error"]["kind"], "config_parse");
    }

    #[tokio::test]
    async fn test_stream_emits_snapshot_and_removal() {
        let (_dir, bridge, mut rx) = bridge();

        let built = bridge
            .dispatch(
                "buildEncode",
                &json!({ "videoUri": "a.mp4", "resultName": "e.mp4", "config": { "framesRate": "sixtyFps" } }),
            )
            .await
            .unwrap();
        let id = built["id"].as_str().unwrap().to_string();

        let opened = bridge.dispatch("streamById", &json!({ "id": id })).await.unwrap();
        let subscription_id = opened["subscriptionId"].as_u64().unwrap();

        let initial = next(&mut rx).await;
        assert_eq!(initial["event"], "stream");
        assert_eq!(initial["subscriptionId"], subscription_id);
        assert_eq!(initial["removed"], false);
        assert_eq!(initial["result"]["status"], "idle");

        bridge.dispatch("delete", &json!({ "id": id })).await.unwrap();
        let removed = next(&mut rx).await;
        assert_eq!(removed["removed"], true);

        tokio::time::timeout(Duration::from_secs(1), async {
            while bridge.open_streams() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!bridge.close_stream(subscription_id).await);
    }

    #[tokio::test]
    async fn test_close_collection_stream() {
        let (_dir, bridge, mut rx) = bridge();

        let opened = bridge.dispatch("streamAll", &json!({ "status": "bogus" })).await.unwrap();
        let subscription_id = opened["subscriptionId"].as_u64().unwrap();

        let initial = next(&mut rx).await;
        assert_eq!(initial["event"], "allStream");
        assert_eq!(initial["result"], json!([]));

        assert!(bridge.close_stream(subscription_id).await);
        assert_eq!(bridge.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_stream_response_precedes_events() {
        let (_dir, bridge, mut rx) = bridge();

        let built = bridge
            .dispatch("buildConcat", &json!({ "videoUris": ["a.mp4"], "resultName": "c.mp4" }))
            .await
            .unwrap();
        let id = built["id"].as_str().unwrap().to_string();

        let line = json!({ "callId": 9, "method": "streamById", "params": { "id": id } });
        bridge.handle_line(&line.to_string()).await;

        let response = next(&mut rx).await;
        assert_eq!(response["callId"], 9);
        let subscription_id = response["result"]["subscriptionId"].as_u64().unwrap();

        let initial = next(&mut rx).await;
        assert_eq!(initial["event"], "stream");
        assert_eq!(initial["subscriptionId"], subscription_id);
    }

    #[tokio::test]
    async fn test_no_events_after_close_response() {
        let (_dir, bridge, mut rx) = bridge();

        bridge.handle_line(r#"{"callId":1,"method":"streamAll","params":{}}"#).await;
        let subscription_id = next(&mut rx).await["result"]["subscriptionId"].as_u64().unwrap();
        assert_eq!(next(&mut rx).await["event"], "allStream");

        let line = json!({ "callId": 2, "method": "closeStream", "params": { "subscriptionId": subscription_id } });
        bridge.handle_line(&line.to_string()).await;
        let closed = next(&mut rx).await;
        assert_eq!(closed["callId"], 2);
        assert_eq!(closed["result"], true);

        bridge
            .dispatch("buildConcat", &json!({ "videoUris": ["a.mp4"], "resultName": "c.mp4" }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.open_streams(), 0);
    }
}
