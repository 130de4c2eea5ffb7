//! # megafs
//!
//! Client library for MEGA's end-to-end encrypted cloud filesystem.
//!
//! ## Features
//!
//! - **Authentication**: email/password login (both key-derivation schemes,
//!   optional two-factor code) and session dump/resume.
//! - **Filesystem tree**: node keys and attributes are decrypted locally;
//!   lookups by handle or by path.
//! - **Live updates**: a background event loop applies remote changes to
//!   the tree while the session is open.
//! - **Node operations**: create folders, rename, move, trash or destroy.
//! - **Transfers**: chunked AES-CTR download and upload with whole-file
//!   MAC verification, progress callbacks and cancellation.
//!
//! ## Example
//!
//! ```no_run
//! use megafs::{CancellationToken, Mega};
//!
//! # async fn example() -> megafs::Result<()> {
//! let mega = Mega::new()?;
//! mega.login("user@example.com", "password", None).await?;
//!
//! let root = mega.root().await.expect("tree loaded");
//! let mut file = tokio::fs::File::open("report.pdf").await?;
//! let size = file.metadata().await?.len();
//! let node = mega
//!     .upload_file(&root, "report.pdf", size, &mut file, &CancellationToken::new())
//!     .await?;
//! println!("uploaded {}", node.handle);
//!
//! let quota = mega.get_quota().await?;
//! println!("{} of {} bytes used", quota.used, quota.total);
//!
//! mega.logout().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod base64;
pub mod cancel;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod http;
pub mod progress;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use cancel::{CancellationListener, CancellationToken};
pub use config::ClientConfig;
pub use error::{MegaError, Result};
pub use fs::{MegaFs, Node, NodeType, Quota};
pub use http::{HttpClient, HttpResponse, Transport};
pub use progress::{ProgressCallback, TransferProgress};
pub use session::{Mega, SessionStatus};
pub use transfer::{Download, Upload};
