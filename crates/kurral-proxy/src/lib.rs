pub mod rpc;
pub mod server;
pub mod sse;

pub use rpc::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, CODE_INVALID_REQUEST, CODE_REPLAY_MISS,
    CODE_UPSTREAM_TIMEOUT,
};
pub use server::{
    build_app, serve, ProxyConfig, ProxyMode, ProxyState, ReplaySpeed, DEFAULT_EVENT_WINDOW,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use sse::{format_event, RawSseEvent, SseParser};
