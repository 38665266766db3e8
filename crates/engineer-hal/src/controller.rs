//! `ControllerManager` – the controller switching and calibration-status
//! service used by calibration queues.
//!
//! Starting and stopping controllers hands a joint between its normal
//! controller and its calibration controller.  Calibration status is
//! obtained with a non-blocking [`query_calibration`][ControllerManager::query_calibration]
//! request whose answer is later visible through
//! [`is_calibrated`][ControllerManager::is_calibrated].

use engineer_types::ManualError;

pub trait ControllerManager: Send {
    /// Start the named controllers.
    ///
    /// # Errors
    ///
    /// Returns [`ManualError::HardwareFault`] if the switch was refused.
    fn start_controllers(&mut self, names: &[String]) -> Result<(), ManualError>;

    /// Stop the named controllers.
    ///
    /// # Errors
    ///
    /// Returns [`ManualError::HardwareFault`] if the switch was refused.
    fn stop_controllers(&mut self, names: &[String]) -> Result<(), ManualError>;

    /// Ask the calibration controller of `step` to report its status.
    /// Must not block.
    fn query_calibration(&mut self, step: &str);

    /// Latest known calibration status of `step`.
    fn is_calibrated(&self, step: &str) -> bool;

    /// Forget any previous calibration result for `step`.
    fn clear_calibrated(&mut self, step: &str);
}
