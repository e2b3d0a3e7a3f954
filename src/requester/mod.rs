//! Async block requester (§4.3): overlaps many block fetches against a
//! blocking request backend using a bounded buffer pool.
#![allow(dead_code)]

use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::external::RequestBackend;

#[derive(Clone)]
enum Outcome {
	Ready(Arc<Vec<u8>>),
	Failed(Arc<String>),
}

enum ResponseState {
	Pending(oneshot::Receiver<Outcome>),
	Ready(Outcome),
}

/// A single in-flight (or completed) block fetch. Every accessor is a
/// one-shot await: the first call to resolve the underlying receiver
/// caches the outcome, so later calls return immediately.
pub struct Response {
	state: Arc<AsyncMutex<ResponseState>>,
	size: usize,
	pool: Arc<BufferPool>,
	closed: Arc<AtomicBool>,
}

impl Response {
	async fn resolve(&self) -> Outcome {
		let mut guard = self.state.lock().await;
		if let ResponseState::Ready(outcome) = &*guard {
			return outcome.clone();
		}
		let placeholder = ResponseState::Ready(Outcome::Failed(Arc::new("internal: unresolved response".into())));
		let pending = std::mem::replace(&mut *guard, placeholder);
		let outcome = match pending {
			ResponseState::Pending(rx) => {
				rx.await.unwrap_or_else(|_| Outcome::Failed(Arc::new("requester shut down".into())))
			}
			ResponseState::Ready(outcome) => outcome,
		};
		*guard = ResponseState::Ready(outcome.clone());
		outcome
	}

	pub async fn wait_error(&self) -> Option<SyncError> {
		match self.resolve().await {
			Outcome::Ready(_) => None,
			Outcome::Failed(message) => Some(SyncError::Other { message: (*message).clone() }),
		}
	}

	pub async fn bytes(&self) -> Result<Arc<Vec<u8>>, SyncError> {
		match self.resolve().await {
			Outcome::Ready(buf) => Ok(buf),
			Outcome::Failed(message) => Err(SyncError::Other { message: (*message).clone() }),
		}
	}

	pub async fn write_to(&self, sink: &mut impl Write) -> Result<(), SyncError> {
		let buf = self.bytes().await?;
		sink.write_all(&buf[..self.size]).map_err(SyncError::from)
	}

	pub async fn write_at(&self, sink: &mut (impl Write + Seek), offset: u64) -> Result<(), SyncError> {
		let buf = self.bytes().await?;
		sink.seek(SeekFrom::Start(offset)).map_err(SyncError::from)?;
		sink.write_all(&buf[..self.size]).map_err(SyncError::from)
	}

	/// Release the buffer back to the pool. Idempotent; safe to call more
	/// than once or never (the pool just grows on demand either way).
	pub async fn close(&self) {
		if !self.closed.swap(true, Ordering::SeqCst) {
			self.pool.release().await;
		}
	}
}

struct Job {
	name: String,
	offset: u64,
	hash: [u8; 32],
	size: usize,
	tx: oneshot::Sender<Outcome>,
}

/// Fixed-block-size buffer pool. Grows on demand, never shrinks below
/// `low_water` (the requester's parallelism `P`).
struct BufferPool {
	max_block_size: usize,
	idle: AsyncMutex<Vec<Vec<u8>>>,
}

impl BufferPool {
	fn new(max_block_size: usize, low_water: usize) -> Self {
		let idle = (0..low_water).map(|_| vec![0u8; max_block_size]).collect();
		BufferPool { max_block_size, idle: AsyncMutex::new(idle) }
	}

	async fn acquire(&self) -> Vec<u8> {
		let mut idle = self.idle.lock().await;
		idle.pop().unwrap_or_else(|| vec![0u8; self.max_block_size])
	}

	/// Returns a fresh pool-sized buffer to the idle set. The exact buffer
	/// handed out for a request is never reclaimed once it moves into a
	/// completed `Response` (callers may hold `Arc` clones of it), so
	/// `close()` restocks the pool with an equivalent buffer instead.
	async fn release(&self) {
		let mut idle = self.idle.lock().await;
		idle.push(vec![0u8; self.max_block_size]);
	}

	async fn idle_len(&self) -> usize {
		self.idle.lock().await.len()
	}
}

/// Join handles for the requester's worker tasks, kept separate from
/// `Requester` so the requester itself stays cheaply cloneable.
pub struct RequesterHandle {
	handles: Vec<JoinHandle<()>>,
}

impl RequesterHandle {
	pub async fn join(self) {
		let _ = futures::future::join_all(self.handles).await;
	}
}

/// Bounded-parallelism block fetcher. `parallelism` workers drain a
/// channel of the same capacity; `request` blocks only when both the
/// channel and all workers are saturated.
#[derive(Clone)]
pub struct Requester {
	tx: mpsc::Sender<Job>,
	pool: Arc<BufferPool>,
}

impl Requester {
	pub fn spawn(
		backend: Arc<dyn RequestBackend>,
		parallelism: usize,
		max_block_size: usize,
	) -> (Requester, RequesterHandle) {
		let parallelism = parallelism.max(1);
		let (tx, rx) = mpsc::channel(parallelism);
		let rx = Arc::new(AsyncMutex::new(rx));
		let pool = Arc::new(BufferPool::new(max_block_size, parallelism));

		let mut handles = Vec::with_capacity(parallelism);
		for _ in 0..parallelism {
			let rx = Arc::clone(&rx);
			let backend = Arc::clone(&backend);
			let pool = Arc::clone(&pool);
			handles.push(tokio::spawn(async move {
				loop {
					let job = {
						let mut guard = rx.lock().await;
						guard.recv().await
					};
					let job = match job {
						Some(job) => job,
						None => break,
					};
					let mut buf = pool.acquire().await;
					let outcome = match backend.request(&job.name, job.offset, &job.hash, &mut buf[..job.size]).await
					{
						Ok(()) => Outcome::Ready(Arc::new(buf)),
						Err(e) => Outcome::Failed(Arc::new(e.to_string())),
					};
					let _ = job.tx.send(outcome);
				}
			}));
		}

		(Requester { tx, pool }, RequesterHandle { handles })
	}

	pub async fn request(&self, name: impl Into<String>, offset: u64, hash: [u8; 32], size: usize) -> Response {
		let (tx, rx) = oneshot::channel();
		let job = Job { name: name.into(), offset, hash, size, tx };
		let _ = self.tx.send(job).await;
		Response {
			state: Arc::new(AsyncMutex::new(ResponseState::Pending(rx))),
			size,
			pool: Arc::clone(&self.pool),
			closed: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Close the queue; workers observe the closed channel, drain, and
	/// exit. No `request` call after this is valid.
	pub fn shut_down(self) {
		drop(self.tx);
	}
}


// vim: ts=4
