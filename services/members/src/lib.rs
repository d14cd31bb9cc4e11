//! Members Service
//!
//! REST backend for a registry of member records (name, birth date, address,
//! phone, role, photo URL). Members live in a single MongoDB collection; photos
//! are pushed to Cloudinary through a separate upload route whose public URL
//! the client then stores in the member's `foto` field.
//!
//! ## Features
//!
//! - **Member CRUD**: list (sorted by name), create, partial update and delete
//!   over one document collection, with explicit required-field validation
//! - **Photo Uploads**: multipart `file` forwarded to the media host, answering
//!   with the asset's `secure_url`
//! - **Keep-Alive**: periodic self-ping so idle hosting platforms keep the
//!   process running
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!  HTTP clients ─▶│ HTTP API     │◀──────────────┐
//!                 └──────────────┘               │ GET /ping
//!                   │          │                 │
//!                   ▼          ▼          ┌──────────────┐
//!          ┌──────────────┐ ┌──────────┐  │ Keep-Alive   │
//!          │ Member Store │ │ Media    │  │ Pinger       │
//!          └──────────────┘ │ Uploader │  └──────────────┘
//!                 │         └──────────┘
//!                 ▼               │
//!          ┌──────────────┐       ▼
//!          │ MongoDB      │   Cloudinary
//!          │ members      │
//!          └──────────────┘
//! ```
//!
//! Uploading a photo and saving the member are independent requests; a failed
//! save leaves the uploaded asset in place.

pub mod api;
pub mod config;
pub mod keep_alive;
pub mod media_uploader;
pub mod member_store;

pub use api::{create_router, AppState};
pub use config::Config;
pub use keep_alive::KeepAlive;
pub use media_uploader::{CloudinaryUploader, MediaHost, UploadError};
pub use member_store::{
    InMemoryMemberStore, Member, MemberPatch, MemberStore, MongoMemberStore, NewMember, StoreError,
};
