pub mod record;
pub mod request_params;
