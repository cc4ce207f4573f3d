//! Basic usage of CachingSessionFactory with an in-memory "remote" server

use parking_lot::Mutex;
use remote_session_pool::{CachingSessionFactory, PoolConfiguration, Session, SessionFactory};
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

struct MemorySession {
    id: usize,
    files: Files,
    open: bool,
}

impl Session for MemorySession {
    type Entry = String;

    fn remove(&self, path: &str) -> io::Result<bool> {
        Ok(self.files.lock().remove(path).is_some())
    }

    fn list(&self, path: &str) -> io::Result<Vec<String>> {
        self.list_names(path)
    }

    fn list_names(&self, path: &str) -> io::Result<Vec<String>> {
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|name| name.starts_with(path))
            .cloned()
            .collect())
    }

    fn read(&self, path: &str, sink: &mut dyn Write) -> io::Result<()> {
        let files = self.files.lock();
        let data = files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        sink.write_all(data)
    }

    fn write(&self, source: &mut dyn Read, path: &str) -> io::Result<()> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        self.files.lock().insert(path.to_string(), data);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, from.to_string()))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn mkdir(&self, _path: &str) -> io::Result<bool> {
        Ok(true)
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.files.lock().contains_key(path))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_raw(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let mut data = Vec::new();
        self.read(path, &mut data)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn finalize_raw(&self) -> io::Result<bool> {
        Ok(true)
    }

    fn close(&mut self) -> io::Result<()> {
        println!("   [session {}] disconnected", self.id);
        self.open = false;
        Ok(())
    }
}

#[derive(Default)]
struct MemorySessionFactory {
    files: Files,
    connects: AtomicUsize,
}

impl SessionFactory for MemorySessionFactory {
    type Session = MemorySession;

    fn get_session(&self) -> io::Result<MemorySession> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        println!("   [session {}] connected", id);
        Ok(MemorySession {
            id,
            files: Arc::clone(&self.files),
            open: true,
        })
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== remote_session_pool - Basic Example ===\n");

    let config = PoolConfiguration::new()
        .with_max_pool_size(2)
        .with_wait_timeout(Duration::from_secs(1));
    let cache = CachingSessionFactory::with_config(MemorySessionFactory::default(), config);

    println!("1. Upload and reuse:");
    {
        let mut session = cache.get_session()?;
        session.write(&mut Cursor::new(b"payload".to_vec()), "/inbox/report.csv")?;
        session.close()?;
    }
    {
        let session = cache.get_session()?;
        println!("   Files: {:?}", session.list_names("/inbox")?);
    }
    println!("   Idle sessions: {}\n", cache.pool().idle_count());

    println!("2. Reset while a session is in use:");
    let in_use = cache.get_session()?;
    cache.reset_cache();
    drop(in_use);
    println!("   Idle sessions after release: {}\n", cache.pool().idle_count());

    println!("3. Metrics:");
    for (key, value) in cache.pool().export_metrics() {
        println!("   {}: {}", key, value);
    }

    Ok(())
}
