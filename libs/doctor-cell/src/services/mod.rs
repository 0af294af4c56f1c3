pub mod directory;
pub mod availability;

pub use directory::{DoctorDirectory, InMemoryDoctorDirectory, SupabaseDoctorDirectory};
pub use availability::AvailabilityService;
