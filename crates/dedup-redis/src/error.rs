use jobwatch_dedup::DedupError;

#[allow(clippy::needless_pass_by_value)] // signature required for use with .map_err()
pub(crate) fn map_redis_err(e: redis::RedisError) -> DedupError {
    use redis::ErrorKind;
    match e.kind() {
        ErrorKind::IoError | ErrorKind::AuthenticationFailed => {
            DedupError::Connection(e.to_string())
        }
        _ => DedupError::Other(e.to_string()),
    }
}
