// HTTP handlers. Public routes (`/`, `/health`) live in `server`; everything
// here sits behind JWT auth.
pub mod data;
