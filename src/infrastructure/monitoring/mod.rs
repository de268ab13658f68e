pub mod disk_probe;
