mod http_api_case;
mod lifecycle_case;
mod snapshot_case;
