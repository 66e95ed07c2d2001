pub(crate) mod branch_predictor;
pub(crate) mod functional_unit;
pub(crate) mod register_status;
pub(crate) mod reorder_buffer;
pub(crate) mod reservation_station;
pub(crate) mod speculation;
