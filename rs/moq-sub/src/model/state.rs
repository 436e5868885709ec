use std::{
	fmt,
	future::Future,
	ops::Deref,
	sync::{
		atomic::{self, AtomicUsize},
		Arc,
	},
};

use tokio::sync::watch;

use crate::Error;

#[derive(Default)]
struct State<T> {
	value: T,
	closed: Option<Result<(), Error>>,
}

/// The write half of a watch-backed state cell.
///
/// Cloning shares the same state; the cell is aborted with [Error::Dropped]
/// when the last producer is dropped without an explicit close.
pub struct Producer<T> {
	state: watch::Sender<State<T>>,
	active: Arc<AtomicUsize>,
}

impl<T> Producer<T> {
	pub fn new(value: T) -> Self {
		Self {
			state: watch::Sender::new(State { value, closed: None }),
			active: Arc::new(AtomicUsize::new(1)),
		}
	}

	pub fn consume(&self) -> Consumer<T> {
		Consumer {
			inner: self.state.subscribe(),
		}
	}

	pub fn close(&mut self) -> Result<(), Error> {
		let mut res = Ok(());

		self.state.send_if_modified(|state| {
			if let Some(Err(err)) = state.closed.clone() {
				res = Err(err);
				return false;
			}

			state.closed = Some(Ok(()));
			true
		});

		res
	}

	pub fn abort(&mut self, err: Error) -> Result<(), Error> {
		let mut res = Ok(());

		self.state.send_if_modified(|state| {
			if let Some(Err(closed)) = state.closed.clone() {
				res = Err(closed);
				return false;
			}

			state.closed = Some(Err(err));
			true
		});

		res
	}

	pub fn modify<F, R>(&self, modify: F) -> Result<R, Error>
	where
		F: FnOnce(&mut T) -> R,
	{
		// Will be overwritten.
		let mut result = Err(Error::Cancel);

		self.state.send_if_modified(|state| {
			if let Some(Err(err)) = state.closed.clone() {
				result = Err(err);
				false
			} else {
				result = Ok(modify(&mut state.value));
				true
			}
		});

		result
	}

	pub fn borrow(&self) -> Ref<'_, T> {
		Ref {
			inner: self.state.borrow(),
		}
	}

	/// Block until there are no more consumers.
	// We don't use the `async` keyword so we don't borrow &self across the await.
	pub fn unused(&self) -> impl Future<Output = ()> {
		let state = self.state.clone();
		async move { state.closed().await }
	}

	pub fn is_clone(&self, other: &Self) -> bool {
		self.state.same_channel(&other.state)
	}
}

impl<T: Default> Default for Producer<T> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}

impl<T> Clone for Producer<T> {
	fn clone(&self) -> Self {
		self.active.fetch_add(1, atomic::Ordering::Relaxed);
		Self {
			state: self.state.clone(),
			active: self.active.clone(),
		}
	}
}

impl<T> Drop for Producer<T> {
	fn drop(&mut self) {
		let active = self.active.fetch_sub(1, atomic::Ordering::Release);
		if active != 1 {
			return;
		}

		atomic::fence(atomic::Ordering::Acquire);

		self.state.send_if_modified(|state| {
			if state.closed.is_some() {
				return false;
			}

			state.closed = Some(Err(Error::Dropped));
			true
		});
	}
}

impl<T: fmt::Debug> fmt::Debug for Producer<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		f.debug_struct("Producer")
			.field("state", &state.value)
			.field("closed", &state.closed)
			.finish()
	}
}

/// The read half of a watch-backed state cell.
///
/// Cloning is cheap; each clone observes the same state.
pub struct Consumer<T> {
	inner: watch::Receiver<State<T>>,
}

impl<T> Consumer<T> {
	pub fn closed(&self) -> impl Future<Output = Result<(), Error>> {
		let mut inner = self.inner.clone();
		async move {
			match inner.wait_for(|state| state.closed.is_some()).await {
				Ok(state) => state.closed.clone().unwrap(),
				Err(_) => unreachable!("producer dropped without closing"),
			}
		}
	}

	// Returns when the function returns true or we're closed.
	pub async fn wait_for(&mut self, mut f: impl FnMut(&T) -> bool) -> Result<Ref<'_, T>, Error> {
		let mut matched = false;

		let state = self
			.inner
			.wait_for(|state| {
				// We always want to check the function first, only returning closed if false.
				matched = f(&state.value);
				matched || state.closed.is_some()
			})
			.await
			.expect("producer dropped without closing");

		if !matched {
			if let Some(Err(err)) = state.closed.clone() {
				return Err(err);
			}
		}

		Ok(Ref { inner: state })
	}

	pub fn borrow(&self) -> Ref<'_, T> {
		Ref {
			inner: self.inner.borrow(),
		}
	}

	pub fn is_clone(&self, other: &Self) -> bool {
		self.inner.same_channel(&other.inner)
	}
}

impl<T: fmt::Debug> fmt::Debug for Consumer<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.inner.borrow();
		f.debug_struct("Consumer")
			.field("state", &inner.value)
			.field("closed", &inner.closed)
			.finish()
	}
}

impl<T> Clone for Consumer<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

pub struct Ref<'a, T> {
	inner: watch::Ref<'a, State<T>>,
}

impl<'a, T> Deref for Ref<'a, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		&self.inner.value
	}
}
