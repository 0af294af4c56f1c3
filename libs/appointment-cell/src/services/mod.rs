pub mod availability;
pub mod booking;
pub mod lifecycle;
pub mod management;
pub mod selection;
pub mod store;

pub use availability::AvailabilityResolver;
pub use booking::AppointmentBookingService;
pub use lifecycle::AppointmentLifecycleService;
pub use management::AppointmentManagementService;
pub use selection::{ApplyOutcome, ResolutionTicket, ResolvedSlots, SlotListState, SlotQuery, SlotSelection};
pub use store::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
