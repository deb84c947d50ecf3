pub mod rnn_backend;
