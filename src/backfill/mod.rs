pub mod ingester;
