pub mod dbcollab;
