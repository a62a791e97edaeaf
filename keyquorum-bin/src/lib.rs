pub mod approver_ctl;
pub mod coordinator_ctl;
pub mod gate_ctl;
pub mod node_ctl;
