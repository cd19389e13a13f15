pub mod gateway;
pub mod image;
pub mod invoker;
pub mod metrics;
pub mod providers;
pub mod upload;

pub use gateway::{CredentialSource, GatewaySettings, ModelGateway};
pub use image::{DecodedImage, ImageDecoder};
pub use invoker::{Generation, InvokeError, ResilientInvoker};
pub use metrics::{get_metrics, init_metrics};
