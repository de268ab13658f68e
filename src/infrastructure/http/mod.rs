pub mod propagation_client;
