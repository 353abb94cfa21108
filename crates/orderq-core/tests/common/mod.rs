pub mod order_server;
