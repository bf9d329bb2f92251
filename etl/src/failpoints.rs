use fail::fail_point;

#[cfg(feature = "failpoints")]
use crate::bail;
#[cfg(feature = "failpoints")]
use crate::error::ErrorKind;
use crate::error::EtlResult;

/// Fires after every snapshot part loaded and before the load-finished marker is written.
pub const SNAPSHOT_LOAD__BEFORE_MARKER: &str = "snapshot_load.before_marker";

/// Fires after the capture job is registered and before change application starts.
pub const CAPTURE_REGISTRATION__AFTER_REGISTER: &str = "capture_registration.after_register";

/// Fires after a change file was merged, before it is recorded as applied.
pub const INCREMENTAL_APPLY__AFTER_MERGE: &str = "incremental_apply.after_merge";

/// Evaluates the fail point `name`, returning an error when it is configured to fail.
#[cfg_attr(not(feature = "failpoints"), allow(unused_variables))]
pub fn etl_fail_point(name: &str) -> EtlResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::FailpointTriggered,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
