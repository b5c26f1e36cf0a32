//! Common test utilities
//!
//! In-process memcached-compatible servers on ephemeral ports, speaking just
//! enough of the text protocol for the client under test.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct Store {
    items: HashMap<String, Item>,
    next_cas: u64,
    /// Command verbs in arrival order
    commands: Vec<String>,
    /// Retrievals touching one of these keys answer late
    delays: HashMap<String, Duration>,
}

#[derive(Clone)]
struct Item {
    value: Vec<u8>,
    flags: u16,
    cas: u64,
}

impl Store {
    fn put(&mut self, key: &str, flags: u16, value: Vec<u8>) {
        self.next_cas += 1;
        let cas = self.next_cas;
        self.items
            .insert(key.to_string(), Item { value, flags, cas });
    }
}

/// A running mock memcached server
pub struct MockServer {
    pub address: String,
    store: Arc<Mutex<Store>>,
    handle: JoinHandle<()>,
}

#[allow(dead_code)] // Not every test module uses every helper
impl MockServer {
    /// Keys currently stored on this server
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.store.lock().items.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.store.lock().items.len()
    }

    /// Command verbs received so far, oldest first
    pub fn commands(&self) -> Vec<String> {
        self.store.lock().commands.clone()
    }

    /// Hold back the reply to any get/gets that includes `key`
    pub fn delay_key(&self, key: &str, delay: Duration) {
        self.store.lock().delays.insert(key.to_string(), delay);
    }

    /// Stop accepting connections; established ones stay open
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a mock server on 127.0.0.1 with an OS-assigned port
pub async fn spawn_server() -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let store = Arc::new(Mutex::new(Store::default()));

    let shared = store.clone();
    let handle = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let store = shared.clone();
            tokio::spawn(async move {
                let _ = serve(socket, store).await;
            });
        }
    });

    MockServer {
        address,
        store,
        handle,
    }
}

/// Start `count` independent mock servers
pub async fn spawn_cluster(count: usize) -> Vec<MockServer> {
    let mut servers = Vec::with_capacity(count);
    for _ in 0..count {
        servers.push(spawn_server().await);
    }
    servers
}

/// Addresses of a mock cluster in shard order
pub fn addresses(servers: &[MockServer]) -> Vec<String> {
    servers.iter().map(|s| s.address.clone()).collect()
}

/// Address nothing listens on
#[allow(dead_code)]
pub async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

/// Install a tracing subscriber honoring RUST_LOG; safe to call repeatedly
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn serve(socket: TcpStream, store: Arc<Mutex<Store>>) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            writer.write_all(b"ERROR\r\n").await?;
            continue;
        };

        store.lock().commands.push(command.to_string());

        let reply = match command {
            "get" | "gets" => {
                let delay = {
                    let store = store.lock();
                    parts[1..].iter().filter_map(|k| store.delays.get(*k)).max().copied()
                };
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }

                let store = store.lock();
                let mut out = Vec::new();
                for key in &parts[1..] {
                    if let Some(item) = store.items.get(*key) {
                        let header = if command == "gets" {
                            format!("VALUE {} {} {} {}\r\n", key, item.flags, item.value.len(), item.cas)
                        } else {
                            format!("VALUE {} {} {}\r\n", key, item.flags, item.value.len())
                        };
                        out.extend_from_slice(header.as_bytes());
                        out.extend_from_slice(&item.value);
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(b"END\r\n");
                out
            }
            "set" | "add" | "replace" | "append" | "prepend" | "cas" => {
                let expected = if command == "cas" { 6 } else { 5 };
                let parsed = if parts.len() == expected {
                    parts[2].parse::<u16>().ok().zip(parts[4].parse::<usize>().ok())
                } else {
                    None
                };
                let Some((flags, bytes)) = parsed else {
                    writer.write_all(b"CLIENT_ERROR bad command line format\r\n").await?;
                    continue;
                };

                let mut data = vec![0u8; bytes + 2];
                reader.read_exact(&mut data).await?;
                data.truncate(bytes);

                let token = parts.get(5).and_then(|t| t.parse::<u64>().ok());
                store_item(&mut store.lock(), command, parts[1], flags, data, token).to_vec()
            }
            "delete" if parts.len() == 2 => {
                if store.lock().items.remove(parts[1]).is_some() {
                    b"DELETED\r\n".to_vec()
                } else {
                    b"NOT_FOUND\r\n".to_vec()
                }
            }
            "flush_all" => {
                store.lock().items.clear();
                b"OK\r\n".to_vec()
            }
            "quit" => return Ok(()),
            _ => b"ERROR\r\n".to_vec(),
        };

        writer.write_all(&reply).await?;
    }
}

fn store_item(
    store: &mut Store,
    command: &str,
    key: &str,
    flags: u16,
    data: Vec<u8>,
    token: Option<u64>,
) -> &'static [u8] {
    let existing = store.items.get(key).cloned();
    match (command, existing) {
        ("set", _) | ("add", None) | ("replace", Some(_)) => {
            store.put(key, flags, data);
            b"STORED\r\n"
        }
        ("append", Some(item)) => {
            let mut value = item.value;
            value.extend_from_slice(&data);
            store.put(key, item.flags, value);
            b"STORED\r\n"
        }
        ("prepend", Some(item)) => {
            let mut value = data;
            value.extend_from_slice(&item.value);
            store.put(key, item.flags, value);
            b"STORED\r\n"
        }
        ("cas", None) => b"NOT_FOUND\r\n",
        ("cas", Some(item)) if Some(item.cas) == token => {
            store.put(key, flags, data);
            b"STORED\r\n"
        }
        ("cas", Some(_)) => b"EXISTS\r\n",
        _ => b"NOT_STORED\r\n",
    }
}
