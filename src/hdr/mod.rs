//! HDR classification and encode routing: Dolby Vision and HDR10+ tool wrappers plus
//! the router that picks between them and the plain encode path.

pub mod dovi;
pub mod hdr10plus;
pub mod router;

pub use dovi::DoviTool;
pub use hdr10plus::Hdr10PlusTool;
pub use router::HdrRouter;
