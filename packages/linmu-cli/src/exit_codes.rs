pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const CONFIG_ERROR: i32 = 3;
pub const PARTIAL_FAILURE: i32 = 4;

/// Exit code for a failed build
pub fn for_error(error: &linmu_rs::LinmuError) -> i32 {
    use linmu_rs::LinmuError;
    match error {
        e if e.is_configuration_error() => CONFIG_ERROR,
        LinmuError::MissingData(_) | LinmuError::MalformedData(_) | LinmuError::ParseError(_) => {
            INPUT_ERROR
        }
        _ => EXECUTION_ERROR,
    }
}
