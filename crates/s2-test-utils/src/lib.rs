// s2-test-utils: websocket peers for integration-testing the analyzer.
//
// `MockPeer` is a thin JSON-over-websocket client; `RmSimulator` layers the
// S2 handshake and an FRBC bootstrap on top of it so end-to-end tests can
// drive the emulated CEM without a real resource manager.

pub mod mock_peer;
pub mod mock_peer_server;
pub mod rm_simulator;

pub use mock_peer::MockPeer;
pub use mock_peer_server::{MockPeerServer, MockServerConn};
pub use rm_simulator::RmSimulator;
