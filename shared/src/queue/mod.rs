pub mod nats;

pub use nats::NatsInstantOrderQueue;
