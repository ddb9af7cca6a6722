pub mod attendance_service;
pub mod pin_service;
pub mod reconciler;
pub mod report_service;

pub use attendance_service::{AttendanceError, AttendanceService, AttendanceSession};
pub use pin_service::{PinError, PinService, PinSession, UnlockedSession};
pub use reconciler::{reconcile, spawn_maintenance_task, ReconcileReport, StaleSessionCleaner};
pub use report_service::{Report, ReportError, ReportRows, ReportService};
