//! Consent grants and the access gate.
//!
//! A doctor asks for access to a patient's record ([`OtpIssuer`]); the patient receives a
//! one-time code out of band; the doctor submits it ([`AccessGate::verify_code`]); from then
//! until expiry every protected operation passes [`AccessGate::check_authorized`].
//!
//! Grant states are derived from the stored fields and the current time on every call:
//!
//! ```text
//! Pending ──correct code before expiry──▶ Authorized
//!    │                                        │
//!    └──────────── now > expires_at ──────────┴──▶ Expired (terminal)
//! ```

mod gate;
mod grant;
mod issuer;
mod store;

pub use gate::{AccessGate, VerifyOutcome};
pub use grant::{AccessGrant, GrantState, GrantView, OtpCode};
pub use issuer::{AccessRequest, IssuedGrant, OtpIssuer};
pub use store::GrantStore;
