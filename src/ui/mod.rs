// UI module - scanner window and event loop bridge
//
// - UiBridge: queues updates from tokio tasks onto the Slint event loop
// - ScannerController: wires the scanner window to the scan session

pub mod bridge;
pub mod controller;

pub use bridge::UiBridge;
pub use controller::ScannerController;
