mod metrics_tests;
