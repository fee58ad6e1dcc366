// Declarative commands: status, diff, apply
pub mod declarative;

// Inspecting a single authorized_keys file
pub mod list;
