use crate::Payload;

/// A trait for the collaborator that fills in a record's payload.
///
/// The encoder only ever sees the finished [`Record`]; how `a`, `b` and `c`
/// come about is up to the implementation. This allows you to plug in random
/// data for load tests or fixed data in tests.
///
/// Closures of the form `FnMut(u64) -> Payload` implement this trait.
///
/// # Example
/// ```
/// use infinity::{Payload, PayloadGenerator};
///
/// struct Fixed;
/// impl PayloadGenerator for Fixed {
///     fn generate(&mut self, index: u64) -> Payload {
///         Payload::new(index as i32, 0.5, "fixed")
///     }
/// }
///
/// assert_eq!(Fixed.generate(3), Payload::new(3, 0.5, "fixed"));
/// ```
///
/// [`Record`]: crate::Record
pub trait PayloadGenerator {
    /// Produces the payload for the record at `index`.
    fn generate(&mut self, index: u64) -> Payload;
}

impl<F> PayloadGenerator for F
where
    F: FnMut(u64) -> Payload,
{
    fn generate(&mut self, index: u64) -> Payload {
        self(index)
    }
}

#[cfg(feature = "random")]
pub use random::*;

#[cfg(feature = "random")]
mod random {
    use super::PayloadGenerator;
    use crate::Payload;
    use rand::{Rng, SeedableRng, rng, rngs::StdRng};

    /// A `PayloadGenerator` that draws from the thread-local RNG.
    ///
    /// This type does not store the RNG; it accesses the thread-local
    /// generator on each call, so it is `Send` and may be moved into spawned
    /// tasks freely.
    #[derive(Default, Clone, Copy, Debug)]
    pub struct RandomPayload;

    impl PayloadGenerator for RandomPayload {
        fn generate(&mut self, _index: u64) -> Payload {
            draw(&mut rng())
        }
    }

    /// A reproducible `PayloadGenerator` backed by a seeded [`StdRng`].
    ///
    /// Two instances built from the same seed produce the same payloads in the
    /// same order.
    #[derive(Clone, Debug)]
    pub struct SeededPayload {
        rng: StdRng,
    }

    impl SeededPayload {
        pub fn new(seed: u64) -> Self {
            Self {
                rng: StdRng::seed_from_u64(seed),
            }
        }
    }

    impl PayloadGenerator for SeededPayload {
        fn generate(&mut self, _index: u64) -> Payload {
            draw(&mut self.rng)
        }
    }

    fn draw<R: Rng + ?Sized>(rng: &mut R) -> Payload {
        Payload {
            a: rng.random(),
            b: rng.random_range(0.0_f32..1000.0),
            c: format!("c{:032x}", rng.random::<u128>()),
        }
    }

}
