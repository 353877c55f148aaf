pub mod mock_rpc_client;

pub use mock_rpc_client::MockRpcClient;
