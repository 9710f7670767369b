mod data_query;
mod discovery_run;
mod search;
