pub mod hosted;

pub use hosted::HostedModelClient;
