/// A producer/consumer pair, usually returned by a `produce()` method.
pub struct Produce<P, C> {
	pub producer: P,
	pub consumer: C,
}
