//! In-memory agent harness for tests

use super::transport::{InboundReceiver, Transport, TransportOptions};
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

/// The agent's side of an in-memory connection.
pub(crate) struct AgentEnd {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl AgentEnd {
    /// Next frame the client sent, parsed.
    pub async fn recv(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .expect("read from client")
            .expect("client closed the stream");
        serde_json::from_str(&line).expect("client sent valid JSON")
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.expect("write");
        self.writer.write_all(b"\n").await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    pub async fn send(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    pub async fn respond(&mut self, id: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    pub async fn respond_error(&mut self, id: &Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    /// Receive a request, check its method, and return it.
    pub async fn expect_request(&mut self, method: &str) -> Value {
        let request = self.recv().await;
        assert_eq!(request["method"], json!(method), "unexpected request: {}", request);
        request
    }
}

/// A transport wired to an in-memory agent.
pub(crate) fn duplex_transport() -> (Transport, InboundReceiver, AgentEnd) {
    let (client, agent) = duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (transport, inbound) = Transport::from_streams(
        client_read,
        client_write,
        &TransportOptions::default(),
        Vec::new(),
    );
    let (agent_read, agent_write) = tokio::io::split(agent);
    let agent = AgentEnd {
        lines: BufReader::new(agent_read).lines(),
        writer: agent_write,
    };
    (transport, inbound, agent)
}
