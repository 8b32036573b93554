pub mod funeral_home;
