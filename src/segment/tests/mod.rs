mod tests_io;
mod tests_naming;
