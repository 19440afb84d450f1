pub mod state_dict;
