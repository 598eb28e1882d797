// gpkg-net/src/lib.rs
pub mod http;
pub mod validation;

pub use http::{
    build_http_client, check_archive, download_to, fetch_url, filename_from_response,
    RemoteArchive,
};
pub use validation::{validate_url, verify_gzip};
